use std::path::{Path, PathBuf};

use facemodes_faceembed::EmbedError;
use facemodes_multimodal::ModeError;
use thiserror::Error;

/// Broad category of a [`PipelineError`], for callers deciding whether to
/// continue, retry, or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The run was configured inconsistently; retrying will not help.
    Config,
    /// A single image could not be processed.
    Item,
    /// Unrecoverable filesystem or stream failure.
    Io,
}

/// A failure confined to one image. The image is left out of the run.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("path {} is not valid UTF-8", .0.display())]
    Path(PathBuf),

    #[error(transparent)]
    Decode(EmbedError),

    #[error("inference {}: {source}", path.display())]
    Inference {
        path: PathBuf,
        #[source]
        source: EmbedError,
    },
}

impl ItemError {
    /// Returns the image the error refers to.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ItemError::Path(p) => Some(p),
            ItemError::Decode(EmbedError::Open { path, .. } | EmbedError::Decode { path, .. }) => Some(path),
            ItemError::Decode(_) => None,
            ItemError::Inference { path, .. } => Some(path),
        }
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config: {0}")]
    Config(String),

    #[error(transparent)]
    Item(#[from] ItemError),

    #[error("walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("read embeddings {}: {source}", path.display())]
    CacheRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse embeddings {}: {source}", path.display())]
    CacheParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("write embeddings {}: {source}", path.display())]
    CacheWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("embedding for {key:?} has {got} components, expected {expected}")]
    CacheDimension { key: String, expected: usize, got: usize },

    #[error("mode store {context}: {source}")]
    ModeStore {
        context: String,
        #[source]
        source: ModeError,
    },

    #[error("create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("copy {} -> {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("copy {} -> {}: not a complete file written ({written} of {expected} bytes)", from.display(), to.display())]
    ShortCopy {
        from: PathBuf,
        to: PathBuf,
        expected: u64,
        written: u64,
    },

    #[error("write peaks: {0}")]
    Peaks(#[source] serde_json::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Config(_) | PipelineError::CacheDimension { .. } => ErrorKind::Config,
            PipelineError::ModeStore {
                source: ModeError::DimensionMismatch { .. },
                ..
            } => ErrorKind::Config,
            PipelineError::Item(_) => ErrorKind::Item,
            _ => ErrorKind::Io,
        }
    }
}

pub(crate) fn mode_io(context: String, e: std::io::Error) -> PipelineError {
    PipelineError::ModeStore {
        context,
        source: ModeError::Io(e.to_string()),
    }
}
