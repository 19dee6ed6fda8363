use thiserror::Error;

#[derive(Debug, Error)]
pub enum EstimateError {
    #[error("Invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Output buffer too small: need {needed} entries, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Unknown quantization level: {0}")]
    UnknownQuantization(String),

    #[error("Unknown GPU backend: {0} (expected auto, cuda, metal, vulkan, rocm or sycl)")]
    UnknownBackend(String),

    #[error("Unknown memory topology: {0} (expected unified or discrete)")]
    UnknownTopology(String),

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl EstimateError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EstimateError::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EstimateError>;
