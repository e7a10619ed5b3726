//! Face-embedding mode clustering pipeline.
//!
//! Walks a directory of JPEG faces, embeds each image with a
//! [`FaceEmbedder`](facemodes_faceembed::FaceEmbedder), accumulates the
//! vectors in a [`MultiModal`](facemodes_multimodal::MultiModal) mode store
//! and caches `path -> embedding` on disk. Afterwards every cached image is
//! copied into the directory of its nearest peak.
//!
//! ```text
//! faces/ --walk--> decode --embed--> ModeStore.insert
//!                                  \-> EmbeddingCache
//!
//! ModeStore.peaks --> stdout (JSON)
//!                 \-> clusters/<peak id>/image<n>.jpg
//! ```
//!
//! Everything runs on the calling thread. [`run`] drives one pass from a
//! [`PipelineConfig`]; the stages are public for callers that need only a
//! part of it.

mod assign;
mod cache;
mod config;
mod error;
mod extract;
mod pipeline;
mod walk;

pub use assign::{Assignment, MaterializeReport, assign, copy_verified, materialize, nearest_peak, peak_dir, place};
pub use cache::EmbeddingCache;
pub use config::{
    CachePolicy, DEFAULT_EMBEDDING_SIZE, DEFAULT_MAX_NODES, DEFAULT_PRIME_OUTPUT, ItemErrorPolicy, PipelineConfig,
    Preset,
};
pub use error::{ErrorKind, ItemError, PipelineError};
pub use extract::{ExtractOptions, ExtractReport, extract};
pub use pipeline::{RunReport, open_store, resolve_dimension, run};
pub use walk::{discover, has_extension};
