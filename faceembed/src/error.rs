use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by faceembed operations.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode {}: {msg}", path.display())]
    Decode { path: PathBuf, msg: String },

    #[error("unsupported device {0:?}")]
    UnsupportedDevice(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("model error: {0}")]
    Model(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("inference engine unavailable: {0}")]
    Unavailable(String),
}
