use thiserror::Error;

/// Errors returned by mode store operations.
#[derive(Debug, Error)]
pub enum ModeError {
    #[error("multimodal: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("multimodal: vector contains a non-finite component")]
    NonFinite,

    #[error("multimodal: {0}")]
    Io(String),

    #[error("multimodal: invalid format: {0}")]
    InvalidFormat(String),
}
