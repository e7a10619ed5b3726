//! Durable path -> embedding mapping.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::PipelineError;

/// Maps image paths to their embedding vectors.
///
/// Stored on disk as a single JSON object (`{"faces/a.jpg": [0.1, ...]}`).
/// Iteration is sorted by path, so repeated runs over the same cache see
/// the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingCache {
    entries: BTreeMap<String, Vec<f32>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache at `path`. A missing file yields an empty cache.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                info!(path = %path.display(), "primemodes: no embedding cache, starting empty");
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(PipelineError::CacheRead {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let entries: BTreeMap<String, Vec<f32>> =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| PipelineError::CacheParse {
                path: path.to_path_buf(),
                source,
            })?;
        let cache = Self { entries };
        cache.dimension()?;
        debug!(path = %path.display(), entries = cache.len(), "primemodes: embedding cache loaded");
        Ok(cache)
    }

    /// Writes the whole mapping to `path`, replacing any previous contents.
    ///
    /// The document goes to a sibling temporary file first and is renamed
    /// into place, so a failed save leaves the old file intact.
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let tmp = tmp_path(path);
        let write_err = |source| PipelineError::CacheWrite {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(&tmp).map_err(write_err)?;
        let mut w = BufWriter::new(file);
        serde_json::to_writer(&mut w, &self.entries).map_err(|e| write_err(e.into()))?;
        w.write_all(b"\n").map_err(write_err)?;
        let file = w.into_inner().map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(e));
        }
        debug!(path = %path.display(), entries = self.len(), "primemodes: embedding cache saved");
        Ok(())
    }

    /// Records `vector` for `path`, replacing any earlier entry.
    pub fn insert(&mut self, path: impl Into<String>, vector: Vec<f32>) -> Option<Vec<f32>> {
        self.entries.insert(path.into(), vector)
    }

    pub fn get(&self, path: &str) -> Option<&[f32]> {
        self.entries.get(path).map(Vec::as_slice)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(path, vector)` pairs in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Returns the common vector length, or `None` for an empty cache.
    ///
    /// Fails with [`PipelineError::CacheDimension`] naming the first entry
    /// whose length differs from the first entry's.
    pub fn dimension(&self) -> Result<Option<usize>, PipelineError> {
        let Some(first) = self.entries.values().next().map(Vec::len) else {
            return Ok(None);
        };
        self.check_dimension(first)?;
        Ok(Some(first))
    }

    /// Checks that every entry has exactly `dim` components.
    pub fn check_dimension(&self, dim: usize) -> Result<(), PipelineError> {
        match self.entries.iter().find(|(_, v)| v.len() != dim) {
            Some((key, v)) => Err(PipelineError::CacheDimension {
                key: key.clone(),
                expected: dim,
                got: v.len(),
            }),
            None => Ok(()),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Vec<f32>)> for EmbeddingCache {
    fn from_iter<I: IntoIterator<Item = (K, Vec<f32>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
