//! Error types for this crate.
//!
//! All fallible operations return [`Result<T>`] which uses [`PipelineError`] as the error type.

use thiserror::Error;

/// A [`Result`](std::result::Result) alias using [`PipelineError`] as the error type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// The unified error type for all crate errors.
///
/// `Load`, `Download` and `Device` are normally recovered inside the crate
/// (placeholder model, CPU fallback). The rest reach the caller, who can show
/// the message and let the user retry.
///
/// # Example
///
/// ```rust,no_run
/// use genre_predictor::error::PipelineError;
///
/// fn handle_error(e: PipelineError) {
///     match &e {
///         PipelineError::NotReady(_) => {
///             // Model still loading - wait and retry
///         }
///         PipelineError::Decode(_) => {
///             // Unreadable image - ask for another file
///         }
///         PipelineError::Inference(_) => {
///             // Forward pass failed - retry or report
///         }
///         _ => {
///             eprintln!("prediction failed: {e}");
///         }
///     }
/// }
/// ```
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PipelineError {
    /// Model artifact could not be read or parsed.
    #[error("{0}")]
    Load(String),

    /// Network or download failure. Retry may help.
    #[error("{0}")]
    Download(String),

    /// Compute backend initialization failure. Fall back to CPU.
    #[error("{0}")]
    Device(String),

    /// Input image could not be fetched or decoded.
    #[error("{0}")]
    Decode(String),

    /// Prediction requested before the model finished loading.
    #[error("{0}")]
    NotReady(String),

    /// Failure while running the model.
    #[error("{0}")]
    Inference(String),

    /// Invalid configuration.
    #[error("{0}")]
    Config(String),

    /// Internal error. Report if seen.
    #[error("{0}")]
    Unexpected(String),
}

impl From<hf_hub::api::tokio::ApiError> for PipelineError {
    fn from(value: hf_hub::api::tokio::ApiError) -> Self {
        PipelineError::Download(format!("HuggingFace API error: {}", value))
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(value: reqwest::Error) -> Self {
        PipelineError::Download(value.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(value: image::ImageError) -> Self {
        PipelineError::Decode(format!("Failed to decode image: {value}"))
    }
}

impl From<candle_core::Error> for PipelineError {
    fn from(value: candle_core::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(value: std::io::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(value: serde_json::Error) -> Self {
        PipelineError::Unexpected(value.to_string())
    }
}
