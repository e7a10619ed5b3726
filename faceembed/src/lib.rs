//! Face embedding extraction.
//!
//! The pipeline that feeds a face image to a model has two stages:
//!
//! 1. [`decode_jpeg`]: JPEG file -> RGB24 image
//! 2. [`FaceEmbedder::embed`]: RGB24 image -> embedding vector
//!
//! [`open_embedder`] builds the engine from a model description (`.param`)
//! and weights (`.bin`) pair. The ncnn engine is only compiled in with the
//! `ncnn` cargo feature; without it, [`open_embedder`] reports
//! [`EmbedError::Unavailable`] and callers supply their own
//! [`FaceEmbedder`].

mod decode;
mod device;
mod error;
mod model;
#[cfg(feature = "ncnn")]
mod model_ncnn;
#[cfg(feature = "ncnn")]
mod ncnn;

pub use decode::{decode_jpeg, to_planar};
pub use device::Device;
pub use error::EmbedError;
pub use image::RgbImage;
pub use model::{EmbedderOptions, FaceEmbedder, open_embedder};
#[cfg(feature = "ncnn")]
pub use model_ncnn::NcnnFaceModel;
