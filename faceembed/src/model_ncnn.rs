//! [`FaceEmbedder`] implementation using the ncnn inference engine.

use std::path::Path;

use image::RgbImage;
use tracing::debug;

use crate::decode::to_planar;
use crate::device::Device;
use crate::error::EmbedError;
use crate::model::{EmbedderOptions, FaceEmbedder};
use crate::ncnn::Net;

/// Face embedding model backed by an ncnn [`Net`].
///
/// # Pipeline
///
/// 1. RGB24 image -> resize to `input_size x input_size`
/// 2. Planar float tensor, `(p - mean) * scale` per channel
/// 3. One forward pass on a fresh extractor
/// 4. Output length checked against the configured dimension
///
/// The net is released when the model is dropped.
pub struct NcnnFaceModel {
    net: Net,
    device: Device,
    opts: EmbedderOptions,
}

impl NcnnFaceModel {
    /// Loads the `.param` description and `.bin` weights from disk.
    pub fn from_files(
        param: &Path,
        bin: &Path,
        device: Device,
        opts: EmbedderOptions,
    ) -> Result<Self, EmbedError> {
        let net = Net::from_files(param, bin, opts.threads)?;
        debug!(
            param = %param.display(),
            device = %device,
            dim = opts.dim,
            input = opts.input_size,
            "faceembed: ncnn model loaded"
        );
        Ok(Self { net, device, opts })
    }

    /// Returns the device inference runs on.
    pub fn device(&self) -> Device {
        self.device
    }
}

impl FaceEmbedder for NcnnFaceModel {
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError> {
        let side = self.opts.input_size;
        let tensor = to_planar(image, side, side, self.opts.mean, self.opts.scale);
        let out = self.net.forward(
            &self.opts.input_name,
            &self.opts.output_name,
            (side as i32, side as i32, 3),
            &tensor,
        )?;
        if out.len() != self.opts.dim {
            return Err(EmbedError::DimensionMismatch {
                expected: self.opts.dim,
                got: out.len(),
            });
        }
        Ok(out)
    }

    fn embedding_size(&self) -> usize {
        self.opts.dim
    }
}
