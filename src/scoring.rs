use crate::config::ScoringPolicy;
use crate::error::LIFE_LINE_NOT_DETECTED_HINT;
use crate::lifeline::LifeLineCandidate;
use crate::metrics::PalmMetrics;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatioMeasurement {
    pub reference_width: u32,
    pub life_line_length: f64,
    pub length_ratio: f64,
    pub score: f64,
    /// Closed range `score` is clamped into for `policy`.
    pub score_range: (f64, f64),
    /// Detector density confidence, 0-100.
    pub confidence: f64,
    pub policy: ScoringPolicy,
}

/// Outcome of scoring. Invalid results carry a remediation message and no
/// score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatioResult {
    pub valid: bool,
    #[serde(flatten)]
    pub measurement: Option<RatioMeasurement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RatioResult {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            measurement: None,
            message: Some(message.into()),
        }
    }

    pub fn score(&self) -> Option<f64> {
        self.measurement.as_ref().map(|m| m.score)
    }
}

pub fn score_ratio(
    metrics: &PalmMetrics,
    life_line: &LifeLineCandidate,
    policy: &ScoringPolicy,
) -> RatioResult {
    if !life_line.detected {
        return RatioResult::invalid(LIFE_LINE_NOT_DETECTED_HINT);
    }

    let length = finite_or_zero(life_line.estimated_length).max(0.0);
    let confidence = finite_or_zero(life_line.confidence).clamp(0.0, 100.0);
    let ratio = length_ratio(length, metrics.reference_width);

    let score = match policy {
        ScoringPolicy::PiecewiseLinear => piecewise_linear_score(ratio),
        ScoringPolicy::ConfidenceWeighted { divisor } => {
            confidence_weighted_score(ratio, *divisor, confidence / 100.0)
        }
        ScoringPolicy::Proportional => proportional_score(ratio),
    };
    let (lo, hi) = policy.range();
    let score = score.clamp(lo, hi);

    log::debug!(
        "Ratio {:.3} (length {:.1} / reference {}) scored {:.1} with {:?}",
        ratio,
        length,
        metrics.reference_width,
        score,
        policy
    );

    RatioResult {
        valid: true,
        measurement: Some(RatioMeasurement {
            reference_width: metrics.reference_width,
            life_line_length: length,
            length_ratio: ratio,
            score,
            score_range: (lo, hi),
            confidence,
            policy: *policy,
        }),
        message: None,
    }
}

/// Length over reference width, with the denominator floored at 1.
pub fn length_ratio(length: f64, reference_width: u32) -> f64 {
    finite_or_zero(length) / reference_width.max(1) as f64
}

/// <= 2 scores 30, then linear to 80 at 5.5 and to 100 at 9.
pub fn piecewise_linear_score(ratio: f64) -> f64 {
    let ratio = finite_or_zero(ratio);
    let score = if ratio <= 2.0 {
        30.0
    } else if ratio <= 5.5 {
        30.0 + (ratio - 2.0) / 3.5 * 50.0
    } else if ratio <= 9.0 {
        80.0 + (ratio - 5.5) / 3.5 * 20.0
    } else {
        100.0
    };
    score.clamp(25.0, 100.0)
}

/// `confidence` is a fraction in [0, 1].
pub fn confidence_weighted_score(ratio: f64, divisor: f64, confidence: f64) -> f64 {
    let ratio = finite_or_zero(ratio);
    let divisor = if divisor > 0.0 && divisor.is_finite() {
        divisor
    } else {
        1.0
    };
    let confidence = finite_or_zero(confidence).clamp(0.0, 1.0);
    let base = (ratio / divisor * 85.0).clamp(25.0, 100.0);
    (base * (0.7 + 0.3 * confidence)).clamp(0.0, 100.0)
}

pub fn proportional_score(ratio: f64) -> f64 {
    finite_or_zero(ratio).clamp(0.0, 100.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ReferenceSource;
    use crate::segment::BoundingBox;

    fn metrics(reference_width: u32) -> PalmMetrics {
        let bbox = BoundingBox {
            x: 0,
            y: 0,
            width: 270,
            height: 300,
        };
        PalmMetrics {
            width: bbox.width,
            height: bbox.height,
            area: 81_000.0,
            bbox,
            reference_width,
            reference_source: ReferenceSource::GeometricProxy,
            reference_estimated: true,
        }
    }

    fn candidate(length: f64, confidence: f64, detected: bool) -> LifeLineCandidate {
        LifeLineCandidate {
            detected,
            pixel_count: 400,
            estimated_length: length,
            arc_length: length,
            segment_count: 1,
            confidence,
            search_region: BoundingBox {
                x: 0,
                y: 100,
                width: 135,
                height: 200,
            },
        }
    }

    #[test]
    fn test_piecewise_is_continuous_at_breakpoints() {
        assert!((piecewise_linear_score(2.0) - 30.0).abs() < 1e-9);
        assert!((piecewise_linear_score(2.0 + 1e-9) - 30.0).abs() < 1e-6);
        assert!((piecewise_linear_score(5.5) - 80.0).abs() < 1e-9);
        assert!((piecewise_linear_score(5.5 + 1e-9) - 80.0).abs() < 1e-6);
        assert!((piecewise_linear_score(9.0) - 100.0).abs() < 1e-9);
        assert!((piecewise_linear_score(9.0 + 1e-9) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn test_scores_stay_in_range_for_extreme_ratios() {
        for ratio in [0.0, 1000.0, f64::NAN, f64::INFINITY, -3.0] {
            let piecewise = piecewise_linear_score(ratio);
            assert!((25.0..=100.0).contains(&piecewise), "{ratio} -> {piecewise}");
            for divisor in [5.0, 5.5] {
                for confidence in [0.0, 0.5, 1.0] {
                    let weighted = confidence_weighted_score(ratio, divisor, confidence);
                    assert!((0.0..=100.0).contains(&weighted), "{ratio} -> {weighted}");
                }
            }
            let proportional = proportional_score(ratio);
            assert!((0.0..=100.0).contains(&proportional));
        }
    }

    #[test]
    fn test_confidence_weighted_formula() {
        // ratio 5.5 / K 5.5 * 85 = 85, then 85 * (0.7 + 0.3 * 0.5).
        let score = confidence_weighted_score(5.5, 5.5, 0.5);
        assert!((score - 72.25).abs() < 1e-9);
        // Base floor of 25 applies before the confidence weighting.
        assert!((confidence_weighted_score(0.0, 5.0, 0.0) - 17.5).abs() < 1e-9);
        assert!((confidence_weighted_score(1000.0, 5.0, 1.0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_reference_does_not_divide_by_zero() {
        let result = score_ratio(
            &metrics(0),
            &candidate(7.0, 40.0, true),
            &ScoringPolicy::PiecewiseLinear,
        );
        assert!(result.valid);
        let measurement = result.measurement.unwrap();
        assert_eq!(measurement.length_ratio, 7.0);
        assert!(measurement.score.is_finite());
        assert_eq!(measurement.reference_width, 0);
    }

    #[test]
    fn test_undetected_line_is_invalid_without_score() {
        let result = score_ratio(
            &metrics(30),
            &candidate(120.0, 5.0, false),
            &ScoringPolicy::PiecewiseLinear,
        );
        assert!(!result.valid);
        assert!(result.score().is_none());
        assert_eq!(result.message.as_deref(), Some(LIFE_LINE_NOT_DETECTED_HINT));
    }

    #[test]
    fn test_valid_result_carries_policy_range() {
        let policy = ScoringPolicy::confidence_weighted_standard();
        let result = score_ratio(&metrics(30), &candidate(150.0, 80.0, true), &policy);
        let measurement = result.measurement.clone().unwrap();
        assert_eq!(measurement.score_range, (0.0, 100.0));
        assert!((measurement.length_ratio - 5.0).abs() < 1e-9);
        assert!((measurement.confidence - 80.0).abs() < 1e-9);
        // 5 / 5 * 85 = 85, weighted by 0.7 + 0.3 * 0.8.
        assert!((measurement.score - 79.9).abs() < 1e-9);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["valid"], true);
        assert!(json.get("length_ratio").is_some());
        assert!(json.get("message").is_none());
    }
}
