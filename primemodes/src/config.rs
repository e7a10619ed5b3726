//! Run configuration.
//!
//! A [`PipelineConfig`] is built once at startup (preset defaults, then an
//! optional config file, then flags) and passed by reference into every
//! stage. Nothing reads configuration from globals.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Embedding size used when neither a classifier nor an explicit value
/// determines it.
pub const DEFAULT_EMBEDDING_SIZE: usize = 128;

/// Node capacity of a freshly created mode store.
pub const DEFAULT_MAX_NODES: usize = 1024;

/// Mode store file written by the [`Preset::Prime`] variant.
pub const DEFAULT_PRIME_OUTPUT: &str = "output.multimodal";

/// What to do with an image that already has a cached embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Re-run inference on every discovered image, overwriting the cache.
    #[default]
    Refresh,
    /// Reuse cached embeddings and only run inference on new images.
    SkipCached,
}

/// What to do when a single image fails to decode or embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemErrorPolicy {
    /// Log, leave the image out, continue.
    #[default]
    Skip,
    /// End the run with [`PipelineError::Item`].
    Abort,
}

/// Named default sets for the supported pipeline variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Build a mode store; writes `output.multimodal` by default.
    Prime,
    /// Build a mode store, cache embeddings and partition images.
    #[default]
    Cluster,
    /// Print the peaks of a saved mode store.
    Parse,
}

impl Preset {
    pub fn config(self) -> PipelineConfig {
        let base = PipelineConfig {
            faces: None,
            recurse: true,
            classifier_desc: None,
            classifier_weights: None,
            device: "CPU".to_string(),
            embedding_size: None,
            max_nodes: DEFAULT_MAX_NODES,
            output: None,
            input: None,
            extension: ".jpg".to_string(),
            peaks: true,
            embeddings: None,
            clusters: None,
            cache_policy: CachePolicy::Refresh,
            item_errors: ItemErrorPolicy::Skip,
            progress_interval: 100,
        };
        match self {
            Preset::Prime => PipelineConfig {
                output: Some(PathBuf::from(DEFAULT_PRIME_OUTPUT)),
                ..base
            },
            Preset::Cluster => base,
            Preset::Parse => PipelineConfig { max_nodes: 0, ..base },
        }
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "prime" => Ok(Preset::Prime),
            "cluster" => Ok(Preset::Cluster),
            "parse" => Ok(Preset::Parse),
            other => Err(format!("unknown preset {other:?} (want prime, cluster or parse)")),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Preset::Prime => "prime",
            Preset::Cluster => "cluster",
            Preset::Parse => "parse",
        })
    }
}

/// Immutable configuration of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Root directory of the face images. `None` skips extraction.
    pub faces: Option<PathBuf>,

    /// Descend into subdirectories of `faces`.
    pub recurse: bool,

    /// Model description artifact of the inference engine.
    pub classifier_desc: Option<PathBuf>,

    /// Model weights artifact of the inference engine.
    pub classifier_weights: Option<PathBuf>,

    /// Device the inference engine runs on.
    pub device: String,

    /// Explicit embedding size. Must agree with the engine if both are known.
    pub embedding_size: Option<usize>,

    /// Node capacity of a new mode store (0 = unbounded).
    pub max_nodes: usize,

    /// Where to write the mode store at the end of the run.
    pub output: Option<PathBuf>,

    /// Mode store to start from.
    pub input: Option<PathBuf>,

    /// Image file extension, including the dot. Matched case-sensitively.
    pub extension: String,

    /// Print the peak list to stdout.
    pub peaks: bool,

    /// Embedding cache file, read at start and rewritten at the end.
    pub embeddings: Option<PathBuf>,

    /// Root directory for per-peak image copies. Must not exist yet.
    pub clusters: Option<PathBuf>,

    pub cache_policy: CachePolicy,

    pub item_errors: ItemErrorPolicy,

    /// Log progress every this many images.
    pub progress_interval: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Preset::default().config()
    }
}

impl PipelineConfig {
    /// Returns `(description, weights)` when a classifier is configured.
    pub fn classifier(&self) -> Option<(&Path, &Path)> {
        match (&self.classifier_desc, &self.classifier_weights) {
            (Some(d), Some(w)) => Some((d.as_path(), w.as_path())),
            _ => None,
        }
    }

    /// Checks the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let bail = |msg: String| Err(PipelineError::Config(msg));

        if !self.extension.starts_with('.') || self.extension.len() < 2 {
            return bail(format!("extension {:?} must look like \".jpg\"", self.extension));
        }
        if self.progress_interval == 0 {
            return bail("progress interval must be positive".into());
        }
        if self.embedding_size == Some(0) {
            return bail("embedding size must be positive".into());
        }
        match (&self.classifier_desc, &self.classifier_weights) {
            (Some(_), None) => return bail("classifier description given without weights".into()),
            (None, Some(_)) => return bail("classifier weights given without a description".into()),
            _ => {}
        }
        if let (Some(clusters), Some(faces)) = (&self.clusters, &self.faces) {
            if clusters == faces {
                return bail("cluster output directory must differ from the faces directory".into());
            }
        }
        Ok(())
    }
}
