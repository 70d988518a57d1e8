mod color;
pub mod config;
pub mod error;
pub mod fortune;
pub mod lifeline;
mod line_segments;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod scoring;
pub mod segment;

pub use config::{AnalysisConfig, PrecisionTier};
pub use error::{AnalysisError, AnalysisResult};
pub use fortune::FortuneReading;
pub use pipeline::{PalmAnalysis, PalmAnalyzer};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Transport-neutral result of one call. Every outcome, including internal
/// faults, ends up here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisResponse {
    pub success: bool,
    pub input_sha256: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<PalmAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fortune: Option<FortuneReading>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseOptions {
    pub with_fortune: bool,
    /// Fortune seed; derived from the input digest when unset.
    pub seed: Option<u64>,
}

/// Analyze with a one-off analyzer and no fortune stage.
pub fn analyze_palm(image_bytes: &[u8], config: &AnalysisConfig) -> AnalysisResponse {
    match PalmAnalyzer::new(config.clone()) {
        Ok(analyzer) => respond(&analyzer, image_bytes, &ResponseOptions::default()),
        Err(err) => failure(digest_hex(&Sha256::digest(image_bytes)), &err),
    }
}

pub fn respond(
    analyzer: &PalmAnalyzer,
    image_bytes: &[u8],
    options: &ResponseOptions,
) -> AnalysisResponse {
    let digest = Sha256::digest(image_bytes);
    let input_sha256 = digest_hex(&digest);

    let outcome = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(image_bytes)))
        .unwrap_or_else(|panic| Err(AnalysisError::internal(panic_message(panic.as_ref()))));

    match outcome {
        Ok(analysis) => {
            let fortune = options.with_fortune.then(|| {
                let seed = options.seed.unwrap_or_else(|| seed_from_digest(&digest));
                fortune::generate(&analysis, seed)
            });
            AnalysisResponse {
                success: true,
                input_sha256,
                analysis: Some(analysis),
                error: None,
                fortune,
            }
        }
        Err(err) => failure(input_sha256, &err),
    }
}

/// Hex SHA-256 of the input, as reported in responses.
pub fn input_sha256(image_bytes: &[u8]) -> String {
    digest_hex(&Sha256::digest(image_bytes))
}

fn failure(input_sha256: String, err: &AnalysisError) -> AnalysisResponse {
    match err {
        AnalysisError::Internal(details) => {
            log::error!("Palm analysis failed internally: {}", details)
        }
        other => log::warn!("Palm analysis failed: {}", other),
    }
    AnalysisResponse {
        success: false,
        input_sha256,
        analysis: None,
        error: Some(ErrorBody {
            kind: err.kind().to_string(),
            message: err.public_message(),
        }),
        fortune: None,
    }
}

fn digest_hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn seed_from_digest(digest: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    for (dst, src) in bytes.iter_mut().zip(digest) {
        *dst = *src;
    }
    u64::from_le_bytes(bytes)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {}", message)
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
    use imageproc::rect::Rect;
    use std::io::Cursor;

    fn palm_png() -> Vec<u8> {
        let mut image = RgbImage::from_pixel(400, 400, Rgb([128, 128, 128]));
        draw_filled_rect_mut(&mut image, Rect::at(60, 40).of_size(240, 300), Rgb([224, 172, 140]));
        for step in 0..=200 {
            let t = step as f32 / 200.0;
            let u = 1.0 - t;
            let x = u * u * 160.0 + 2.0 * u * t * 80.0 + t * t * 140.0;
            let y = u * u * 150.0 + 2.0 * u * t * 230.0 + t * t * 320.0;
            draw_filled_circle_mut(
                &mut image,
                (x.round() as i32, y.round() as i32),
                2,
                Rgb([90, 50, 40]),
            );
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            input_sha256(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_decode_failure_becomes_response() {
        let response = analyze_palm(b"not an image", &AnalysisConfig::standard());
        assert!(!response.success);
        assert!(response.analysis.is_none());
        assert_eq!(response.error.unwrap().kind, "decode_error");
        assert_eq!(response.input_sha256.len(), 64);
    }

    #[test]
    fn test_invalid_config_becomes_response() {
        let mut config = AnalysisConfig::standard();
        config.preprocess.max_dimension = 0;
        let response = analyze_palm(&palm_png(), &config);
        assert_eq!(response.error.unwrap().kind, "invalid_config");
    }

    #[test]
    fn test_successful_response_with_fortune() {
        let analyzer = PalmAnalyzer::new(AnalysisConfig::standard()).unwrap();
        let options = ResponseOptions {
            with_fortune: true,
            seed: None,
        };
        let bytes = palm_png();
        let first = respond(&analyzer, &bytes, &options);
        assert!(first.success);
        assert!(first.error.is_none());
        let reading = first.fortune.clone().unwrap();
        assert!(reading.success);
        assert_eq!(reading.seed, seed_from_digest(&Sha256::digest(&bytes)));

        let second = respond(&analyzer, &bytes, &options);
        assert_eq!(first.fortune, second.fortune);
    }

    #[test]
    fn test_fortune_is_opt_in() {
        let response = analyze_palm(&palm_png(), &AnalysisConfig::standard());
        assert!(response.success);
        assert!(response.fortune.is_none());
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("fortune").is_none());
        assert!(json["analysis"]["palm_metrics"]["reference_width"].is_u64());
    }

    #[test]
    fn test_panic_message_is_kept_private() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("index out of bounds");
        let err = AnalysisError::internal(panic_message(payload.as_ref()));
        let response = failure(String::new(), &err);
        let body = response.error.unwrap();
        assert_eq!(body.kind, "internal_error");
        assert!(!body.message.contains("index"));
    }
}
