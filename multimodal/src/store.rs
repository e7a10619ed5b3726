use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::ModeError;

/// A mode discovered by a [`ModeStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Stable identifier of the mode.
    pub id: u64,

    /// Centroid of the mode's basin.
    pub mean: Vec<f32>,

    /// Number of inserted vectors attributed to this mode.
    pub count: u64,
}

/// Accumulates embeddings and exposes the modes found among them.
pub trait ModeStore {
    /// Returns the dimensionality every inserted vector must have.
    fn dim(&self) -> usize;

    /// Returns the number of nodes currently held.
    fn len(&self) -> usize;

    /// Returns true if nothing has been inserted.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a vector. Fails with [`ModeError::DimensionMismatch`] if
    /// `v.len() != self.dim()`.
    fn insert(&mut self, v: &[f32]) -> Result<(), ModeError>;

    /// Returns the current peaks. Pure read; reflects every insert so far.
    fn peaks(&self) -> Vec<Peak>;

    /// Serializes the full state to `w`. Returns the number of bytes written.
    ///
    /// ```text
    /// [4B magic "MMOD"] [4B version=1]
    /// [4B dim] [4B max_nodes] [8B next_id] [4B node_count]
    /// For each node:
    ///   [8B id] [8B count] [dim x 4B float32 mean]
    /// ```
    fn write_to(&self, w: &mut dyn Write) -> Result<u64, ModeError>;

    /// Replaces the state with one read from `r`. Returns the number of
    /// bytes consumed.
    fn read_from(&mut self, r: &mut dyn Read) -> Result<u64, ModeError>;
}
