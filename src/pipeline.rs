use crate::color::hsv_pixels;
use crate::config::{AnalysisConfig, PrecisionTier};
use crate::error::{AnalysisError, AnalysisResult};
use crate::lifeline::{detect_life_line, LifeLineCandidate};
use crate::metrics::{measure_palm, PalmMetrics};
use crate::preprocess::prepare_image;
use crate::scoring::{score_ratio, RatioResult};
use crate::segment::{largest_palm_region, segment_skin};
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PerfStats {
    pub decode_ms: u64,
    pub segment_ms: u64,
    pub detect_ms: u64,
    pub total_ms: u64,
}

/// Output record of one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PalmAnalysis {
    pub palm_metrics: PalmMetrics,
    pub life_line: LifeLineCandidate,
    pub ratio: RatioResult,
    /// Dimensions actually processed, after any downscale.
    pub image_size: ImageSize,
    pub original_size: ImageSize,
    pub tier: PrecisionTier,
    pub perf: PerfStats,
}

/// Runs the full pipeline for one configuration. Holds no mutable state, so
/// a single analyzer can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct PalmAnalyzer {
    config: AnalysisConfig,
}

impl PalmAnalyzer {
    pub fn new(config: AnalysisConfig) -> AnalysisResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn analyze(&self, image_bytes: &[u8]) -> AnalysisResult<PalmAnalysis> {
        let config = &self.config;
        let timing_enabled = timing_enabled();
        let t_total = Instant::now();

        let t_decode = Instant::now();
        let prepared = prepare_image(image_bytes, &config.preprocess)?;
        let decode_ms = t_decode.elapsed().as_millis() as u64;
        log::info!(
            "Analyzing {}x{} palm image (tier {:?}, processed at {}x{})",
            prepared.original_width,
            prepared.original_height,
            config.tier,
            prepared.width(),
            prepared.height()
        );

        let t_segment = Instant::now();
        let hsv = hsv_pixels(&prepared.image);
        let mask = segment_skin(&prepared.image, &hsv, &config.segmentation);
        log::debug!("Skin coverage {:.1}%", mask.coverage() * 100.0);
        let region = largest_palm_region(
            &mask,
            &config.segmentation,
            config.calibration.uses_convex_hull(),
        )
        .ok_or_else(AnalysisError::palm_not_found)?;
        let palm_metrics = measure_palm(
            &region,
            &config.calibration,
            &hsv,
            prepared.width(),
            prepared.height(),
        );
        let segment_ms = t_segment.elapsed().as_millis() as u64;

        let t_detect = Instant::now();
        let life_line = detect_life_line(&prepared.image, &hsv, &mask, &region, &config.detection)?;
        let ratio = score_ratio(&palm_metrics, &life_line, &config.scoring);
        let detect_ms = t_detect.elapsed().as_millis() as u64;

        let perf = PerfStats {
            decode_ms,
            segment_ms,
            detect_ms,
            total_ms: t_total.elapsed().as_millis() as u64,
        };
        if timing_enabled {
            log::info!(
                "Palm timing tier={:?} decode={}ms segment={}ms detect={}ms total={}ms",
                config.tier,
                perf.decode_ms,
                perf.segment_ms,
                perf.detect_ms,
                perf.total_ms
            );
        }
        match ratio.score() {
            Some(score) => log::info!(
                "Analysis complete: life line {:.1}px, score {:.1}",
                life_line.estimated_length,
                score
            ),
            None => log::info!("Analysis complete: palm found, life line not detected"),
        }

        Ok(PalmAnalysis {
            palm_metrics,
            life_line,
            ratio,
            image_size: ImageSize {
                width: prepared.width(),
                height: prepared.height(),
            },
            original_size: ImageSize {
                width: prepared.original_width,
                height: prepared.original_height,
            },
            tier: config.tier,
            perf,
        })
    }
}

fn timing_enabled() -> bool {
    matches!(
        std::env::var("PALMLINE_DEBUG_TIMING").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}
