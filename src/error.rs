//! Error types for palm analysis.

use thiserror::Error;

/// Result type alias for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

pub const PALM_NOT_FOUND_HINT: &str =
    "Palm could not be detected. Make sure the palm fills the frame and the lighting is even.";

pub const LIFE_LINE_NOT_DETECTED_HINT: &str =
    "Life line could not be detected. Photograph the whole palm in bright, even light.";

const GENERIC_FAILURE: &str = "Analysis failed due to an internal error.";

/// Fatal outcomes of a single analysis call.
///
/// A missing life line is not an error: it is reported as an invalid
/// [`crate::scoring::RatioResult`] so the palm metrics remain available.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Input bytes are not a decodable (or usable) image.
    #[error("failed to decode image: {0}")]
    Decode(String),

    /// No sufficiently large skin-coloured region was found.
    #[error("{0}")]
    PalmNotFound(String),

    /// Unexpected fault inside the pipeline.
    #[error("internal analysis fault: {0}")]
    Internal(String),

    /// Configuration could not be parsed or is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn decode(details: impl Into<String>) -> Self {
        Self::Decode(details.into())
    }

    pub fn palm_not_found() -> Self {
        Self::PalmNotFound(PALM_NOT_FOUND_HINT.to_string())
    }

    pub fn internal(details: impl Into<String>) -> Self {
        Self::Internal(details.into())
    }

    pub fn config(details: impl Into<String>) -> Self {
        Self::Config(details.into())
    }

    /// Stable identifier used by transport layers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::PalmNotFound(_) => "palm_not_found",
            Self::Internal(_) => "internal_error",
            Self::Config(_) => "invalid_config",
        }
    }

    /// Message safe to hand to an external caller. Internal details are
    /// never exposed.
    pub fn public_message(&self) -> String {
        match self {
            Self::Decode(details) => format!("Invalid image file: {}", details),
            Self::PalmNotFound(hint) => hint.clone(),
            Self::Internal(_) => GENERIC_FAILURE.to_string(),
            Self::Config(details) => format!("Invalid configuration: {}", details),
        }
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AnalysisError::decode("truncated header");
        assert!(format!("{err}").contains("truncated header"));

        let err = AnalysisError::palm_not_found();
        assert!(format!("{err}").contains("fills the frame"));

        let err = AnalysisError::internal("mask size mismatch");
        assert!(format!("{err}").contains("mask size mismatch"));
    }

    #[test]
    fn test_internal_details_stay_private() {
        let err = AnalysisError::internal("index 42 out of range for slice of length 7");
        let public = err.public_message();
        assert!(!public.contains("index 42"));
        assert_eq!(err.kind(), "internal_error");
    }

    #[test]
    fn test_kinds_are_distinct() {
        assert_eq!(AnalysisError::decode("x").kind(), "decode_error");
        assert_eq!(AnalysisError::palm_not_found().kind(), "palm_not_found");
    }
}
