//! Error types for face detection.

use thiserror::Error;

/// Result type for detection operations.
pub type DetectResult<T> = Result<T, DetectError>;

/// Errors that can occur while building a detector or running detection.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Invalid detector configuration: {0}")]
    Config(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Tensor `{tensor}` has {actual} rows, expected {expected} (one per prior)")]
    ShapeMismatch {
        tensor: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Image is empty")]
    EmptyImage,

    #[error("Image is {}x{}, detector input is {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    InputSize {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl DetectError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an inference failure error.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Whether the error stems from the caller's input rather than the detector.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::EmptyImage | Self::InputSize { .. })
    }
}
