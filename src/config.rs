use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};

/// Inclusive HSV range. Hue uses the 0-180 half-degree scale, saturation
/// and value use 0-255.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

/// Inclusive range over (Y, Cr, Cb), all on 0-255.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct YcrcbRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl YcrcbRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, ycrcb: [u8; 3]) -> bool {
        (0..3).all(|c| ycrcb[c] >= self.lower[c] && ycrcb[c] <= self.upper[c])
    }
}

/// Skin hue sits on both sides of the red wraparound, hence two ranges.
pub const SKIN_HSV_STANDARD: [HsvRange; 2] = [
    HsvRange::new([0, 20, 70], [20, 150, 255]),
    HsvRange::new([170, 20, 70], [180, 150, 255]),
];

pub const SKIN_HSV_HIGH_PRECISION: [HsvRange; 2] = [
    HsvRange::new([0, 15, 60], [25, 170, 255]),
    HsvRange::new([165, 15, 60], [180, 170, 255]),
];

/// Broad low-saturation range used when a coloured marker carries the scale.
pub const SKIN_HSV_MARKER: [HsvRange; 1] = [HsvRange::new([0, 0, 50], [180, 100, 255])];

pub const SKIN_YCRCB: YcrcbRange = YcrcbRange::new([0, 133, 77], [255, 173, 127]);

pub const BLUE_MARKER_HSV: HsvRange = HsvRange::new([85, 40, 40], [135, 255, 255]);

pub const GREEN_TRACE_HSV: HsvRange = HsvRange::new([30, 40, 40], [90, 255, 255]);

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrecisionTier {
    Standard,
    HighPrecision,
    ColorMarker,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ContrastEnhancement {
    None,
    /// Contrast-limited adaptive histogram equalization on L*.
    Clahe { clip_limit: f32, tiles: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreprocessConfig {
    pub max_dimension: u32,
    pub contrast: ContrastEnhancement,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    Hsv,
    /// HSV ranges unioned with a YCrCb box.
    HsvYcrcb,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SegmentationConfig {
    pub method: SegmentationMethod,
    pub hsv_ranges: Vec<HsvRange>,
    pub ycrcb_range: YcrcbRange,
    /// Opening kernel edge length in pixels.
    pub open_kernel: u8,
    /// Closing kernel edge length in pixels.
    pub close_kernel: u8,
    pub min_area_fraction: f64,
    pub min_area_px: f64,
}

impl SegmentationConfig {
    pub fn min_area(&self, width: u32, height: u32) -> f64 {
        let image_area = width as f64 * height as f64;
        (image_area * self.min_area_fraction).max(self.min_area_px)
    }
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CalibrationPolicy {
    /// Fraction of the raw contour's bounding-box width.
    GeometricProxy { width_fraction: f64 },
    /// Fraction of the convex hull's bounding-box width.
    HullSmoothedProxy { width_fraction: f64 },
    /// Pixel count of a coloured reference marker.
    ColorMarker { marker: HsvRange },
}

impl CalibrationPolicy {
    pub fn uses_convex_hull(&self) -> bool {
        matches!(self, Self::HullSmoothedProxy { .. })
    }
}

/// Fractional sub-rectangle of the palm bounding box.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchWindow {
    pub x0: f64,
    pub x1: f64,
    pub y0: f64,
    pub y1: f64,
}

impl SearchWindow {
    /// Thumb side, lower two thirds.
    pub const LOWER_LEFT: Self = Self {
        x0: 0.0,
        x1: 0.5,
        y0: 1.0 / 3.0,
        y1: 1.0,
    };

    pub const THUMB_TO_WRIST: Self = Self {
        x0: 0.05,
        x1: 0.55,
        y0: 0.25,
        y1: 0.95,
    };
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LineAggregation {
    LongestContour,
    LineSegments {
        vote_threshold: u32,
        min_length: f64,
        max_gap: f64,
        length_factor: f64,
        fallback_pixel_factor: f64,
    },
    ColorTrace {
        trace: HsvRange,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionConfig {
    pub window: SearchWindow,
    pub denoise_radius: u32,
    pub canny_low: f32,
    pub canny_high: f32,
    pub sobel_threshold: f32,
    pub close_kernel: u8,
    /// Erosion applied to the palm mask so its silhouette is not counted.
    pub boundary_margin: u8,
    pub min_edge_pixels: u32,
    pub confidence_gain: f64,
    pub aggregation: LineAggregation,
}

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScoringPolicy {
    PiecewiseLinear,
    ConfidenceWeighted { divisor: f64 },
    Proportional,
}

impl ScoringPolicy {
    pub const fn confidence_weighted_standard() -> Self {
        Self::ConfidenceWeighted { divisor: 5.0 }
    }

    pub const fn confidence_weighted_high_precision() -> Self {
        Self::ConfidenceWeighted { divisor: 5.5 }
    }

    /// Closed range the final score is clamped into.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::PiecewiseLinear => (25.0, 100.0),
            Self::ConfidenceWeighted { .. } | Self::Proportional => (0.0, 100.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    pub tier: PrecisionTier,
    pub preprocess: PreprocessConfig,
    pub segmentation: SegmentationConfig,
    pub calibration: CalibrationPolicy,
    pub detection: DetectionConfig,
    pub scoring: ScoringPolicy,
}

impl AnalysisConfig {
    /// Standard: HSV skin mask, 1/9 width proxy, longest-contour life line.
    pub fn standard() -> Self {
        Self {
            tier: PrecisionTier::Standard,
            preprocess: PreprocessConfig {
                max_dimension: 1000,
                contrast: ContrastEnhancement::None,
            },
            segmentation: SegmentationConfig {
                method: SegmentationMethod::Hsv,
                hsv_ranges: SKIN_HSV_STANDARD.to_vec(),
                ycrcb_range: SKIN_YCRCB,
                open_kernel: 7,
                close_kernel: 7,
                min_area_fraction: 0.10,
                min_area_px: 0.0,
            },
            calibration: CalibrationPolicy::GeometricProxy {
                width_fraction: 1.0 / 9.0,
            },
            detection: DetectionConfig {
                window: SearchWindow::LOWER_LEFT,
                denoise_radius: 1,
                canny_low: 30.0,
                canny_high: 100.0,
                sobel_threshold: 160.0,
                close_kernel: 3,
                boundary_margin: 8,
                min_edge_pixels: 50,
                confidence_gain: 1000.0,
                aggregation: LineAggregation::LongestContour,
            },
            scoring: ScoringPolicy::PiecewiseLinear,
        }
    }

    /// HighPrecision: CLAHE, HSV plus YCrCb, convex hull smoothing and
    /// line-segment aggregation.
    pub fn high_precision() -> Self {
        Self {
            tier: PrecisionTier::HighPrecision,
            preprocess: PreprocessConfig {
                max_dimension: 1200,
                contrast: ContrastEnhancement::Clahe {
                    clip_limit: 2.0,
                    tiles: 8,
                },
            },
            segmentation: SegmentationConfig {
                method: SegmentationMethod::HsvYcrcb,
                hsv_ranges: SKIN_HSV_HIGH_PRECISION.to_vec(),
                ycrcb_range: SKIN_YCRCB,
                open_kernel: 5,
                close_kernel: 9,
                min_area_fraction: 0.08,
                min_area_px: 5000.0,
            },
            calibration: CalibrationPolicy::HullSmoothedProxy {
                width_fraction: 0.11,
            },
            detection: DetectionConfig {
                window: SearchWindow::THUMB_TO_WRIST,
                denoise_radius: 2,
                canny_low: 20.0,
                canny_high: 80.0,
                sobel_threshold: 120.0,
                close_kernel: 3,
                boundary_margin: 8,
                min_edge_pixels: 100,
                confidence_gain: 1000.0,
                aggregation: LineAggregation::LineSegments {
                    vote_threshold: 30,
                    min_length: 20.0,
                    max_gap: 10.0,
                    length_factor: 0.7,
                    fallback_pixel_factor: 0.5,
                },
            },
            scoring: ScoringPolicy::confidence_weighted_high_precision(),
        }
    }

    /// ColorMarker: a blue marker gives the scale and the life line is
    /// traced in green.
    pub fn color_marker() -> Self {
        Self {
            tier: PrecisionTier::ColorMarker,
            preprocess: PreprocessConfig {
                max_dimension: 1024,
                contrast: ContrastEnhancement::None,
            },
            segmentation: SegmentationConfig {
                method: SegmentationMethod::Hsv,
                hsv_ranges: SKIN_HSV_MARKER.to_vec(),
                ycrcb_range: SKIN_YCRCB,
                open_kernel: 5,
                close_kernel: 5,
                min_area_fraction: 0.0,
                min_area_px: 500.0,
            },
            calibration: CalibrationPolicy::ColorMarker {
                marker: BLUE_MARKER_HSV,
            },
            detection: DetectionConfig {
                window: SearchWindow {
                    x0: 0.0,
                    x1: 1.0,
                    y0: 0.0,
                    y1: 1.0,
                },
                denoise_radius: 1,
                canny_low: 30.0,
                canny_high: 100.0,
                sobel_threshold: 160.0,
                close_kernel: 3,
                boundary_margin: 0,
                min_edge_pixels: 50,
                confidence_gain: 1000.0,
                aggregation: LineAggregation::ColorTrace {
                    trace: GREEN_TRACE_HSV,
                },
            },
            scoring: ScoringPolicy::Proportional,
        }
    }

    pub fn from_tier(tier: PrecisionTier) -> Self {
        match tier {
            PrecisionTier::Standard => Self::standard(),
            PrecisionTier::HighPrecision => Self::high_precision(),
            PrecisionTier::ColorMarker => Self::color_marker(),
        }
    }

    pub fn from_json(raw: &str) -> AnalysisResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| AnalysisError::config(format!("could not parse config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AnalysisResult<()> {
        if self.preprocess.max_dimension < 2 {
            return Err(AnalysisError::config("max_dimension must be at least 2"));
        }
        if let ContrastEnhancement::Clahe { clip_limit, tiles } = self.preprocess.contrast {
            if tiles == 0 || !(clip_limit > 0.0) {
                return Err(AnalysisError::config(
                    "clahe needs at least one tile and a positive clip limit",
                ));
            }
        }
        if self.segmentation.hsv_ranges.is_empty() {
            return Err(AnalysisError::config("at least one HSV skin range is required"));
        }
        if !(0.0..=1.0).contains(&self.segmentation.min_area_fraction)
            || self.segmentation.min_area_px < 0.0
        {
            return Err(AnalysisError::config("minimum palm area is out of range"));
        }
        match self.calibration {
            CalibrationPolicy::GeometricProxy { width_fraction }
            | CalibrationPolicy::HullSmoothedProxy { width_fraction } => {
                if !(width_fraction > 0.0 && width_fraction <= 1.0) {
                    return Err(AnalysisError::config("width_fraction must be in (0, 1]"));
                }
            }
            CalibrationPolicy::ColorMarker { .. } => {}
        }
        let w = self.detection.window;
        let ordered = |a: f64, b: f64| (0.0..=1.0).contains(&a) && (0.0..=1.0).contains(&b) && a < b;
        if !ordered(w.x0, w.x1) || !ordered(w.y0, w.y1) {
            return Err(AnalysisError::config(
                "search window fractions must be ordered and within [0, 1]",
            ));
        }
        if self.detection.canny_low > self.detection.canny_high {
            return Err(AnalysisError::config("canny_low must not exceed canny_high"));
        }
        if let LineAggregation::LineSegments {
            min_length,
            max_gap,
            length_factor,
            ..
        } = self.detection.aggregation
        {
            if min_length <= 0.0 || max_gap < 0.0 || length_factor <= 0.0 {
                return Err(AnalysisError::config("line segment parameters must be positive"));
            }
        }
        if let ScoringPolicy::ConfidenceWeighted { divisor } = self.scoring {
            if !(divisor > 0.0) {
                return Err(AnalysisError::config("scoring divisor must be positive"));
            }
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for tier in [
            PrecisionTier::Standard,
            PrecisionTier::HighPrecision,
            PrecisionTier::ColorMarker,
        ] {
            let config = AnalysisConfig::from_tier(tier);
            assert_eq!(config.tier, tier);
            assert!(config.validate().is_ok(), "{:?} should validate", tier);
        }
    }

    #[test]
    fn test_named_calibrations_disagree() {
        let standard = AnalysisConfig::standard();
        let high = AnalysisConfig::high_precision();
        assert_eq!(
            standard.calibration,
            CalibrationPolicy::GeometricProxy {
                width_fraction: 1.0 / 9.0
            }
        );
        assert_eq!(
            high.calibration,
            CalibrationPolicy::HullSmoothedProxy {
                width_fraction: 0.11
            }
        );
        assert!(high.calibration.uses_convex_hull());
        assert!(!standard.calibration.uses_convex_hull());
    }

    #[test]
    fn test_hsv_range_wraparound() {
        let skin = SKIN_HSV_STANDARD;
        assert!(skin.iter().any(|r| r.contains([5, 80, 200])));
        assert!(skin.iter().any(|r| r.contains([175, 80, 200])));
        assert!(!skin.iter().any(|r| r.contains([90, 80, 200])));
        assert!(!skin.iter().any(|r| r.contains([5, 5, 200])));
    }

    #[test]
    fn test_json_round_trip_keeps_config() {
        let config = AnalysisConfig::high_precision();
        let raw = serde_json::to_string(&config).unwrap();
        let parsed = AnalysisConfig::from_json(&raw).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_window_is_rejected() {
        let mut config = AnalysisConfig::standard();
        config.detection.window = SearchWindow {
            x0: 0.6,
            x1: 0.2,
            y0: 0.0,
            y1: 1.0,
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "invalid_config");
    }

    #[test]
    fn test_min_area_uses_larger_floor() {
        let high = AnalysisConfig::high_precision().segmentation;
        assert_eq!(high.min_area(100, 100), 5000.0);
        assert_eq!(high.min_area(1000, 1000), 80_000.0);
    }
}
