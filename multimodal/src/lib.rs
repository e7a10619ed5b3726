//! Bounded mode-seeking store for embedding vectors.
//!
//! Vectors are inserted one at a time into a node set whose size is capped
//! by `max_nodes`. Once the cap is exceeded, the two closest nodes are
//! merged into their count-weighted mean, so the store keeps a fixed-size
//! summary of everything it has seen. [`ModeStore::peaks`] runs quick-shift
//! mode seeking over that summary and returns one [`Peak`] per mode.
//!
//! # Usage
//!
//! ```
//! use facemodes_multimodal::{ModeStore, MultiModal};
//!
//! let mut store = MultiModal::new(2, 64);
//! store.insert(&[0.0, 0.0]).unwrap();
//! store.insert(&[0.1, 0.0]).unwrap();
//! store.insert(&[9.0, 9.0]).unwrap();
//! store.insert(&[9.1, 9.0]).unwrap();
//!
//! let peaks = store.peaks();
//! assert_eq!(peaks.len(), 2);
//!
//! let mut buf: Vec<u8> = Vec::new();
//! store.write_to(&mut buf).unwrap();
//!
//! let mut restored = MultiModal::new(2, 64);
//! restored.read_from(&mut buf.as_slice()).unwrap();
//! assert_eq!(restored.peaks(), peaks);
//! ```
//!
//! # Stream Format
//!
//! See [`ModeStore::write_to`]. All multi-byte values are little-endian.

mod distance;
mod error;
mod multimodal;
mod multimodal_io;
mod store;

pub use distance::l2_distance;
pub use error::ModeError;
pub use multimodal::MultiModal;
pub use store::{ModeStore, Peak};
