use std::path::Path;

use image::RgbImage;

use crate::EmbedError;
use crate::device::Device;

/// Computes a face embedding from a decoded image.
///
/// The output is a dense f32 vector whose length is always
/// [`FaceEmbedder::embedding_size`].
pub trait FaceEmbedder: Send {
    /// Runs inference on one RGB24 image.
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError>;

    /// Returns the dimensionality of the produced vectors (e.g. 128).
    fn embedding_size(&self) -> usize;
}

impl<T: FaceEmbedder + ?Sized> FaceEmbedder for Box<T> {
    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(image)
    }

    fn embedding_size(&self) -> usize {
        (**self).embedding_size()
    }
}

/// Model-specific knobs for [`open_embedder`].
#[derive(Debug, Clone)]
pub struct EmbedderOptions {
    /// Square input edge the image is resized to (default: 112).
    pub input_size: u32,
    /// Expected embedding dimension (default: 128).
    pub dim: usize,
    /// Input blob name (default: "in0").
    pub input_name: String,
    /// Output blob name (default: "out0").
    pub output_name: String,
    /// Per-channel mean subtracted from pixel values (default: 127.5).
    pub mean: [f32; 3],
    /// Per-channel scale applied after the mean (default: 1/128).
    pub scale: [f32; 3],
    /// CPU threads for inference; 0 keeps the engine default.
    pub threads: usize,
}

impl Default for EmbedderOptions {
    fn default() -> Self {
        Self {
            input_size: 112,
            dim: 128,
            input_name: "in0".to_string(),
            output_name: "out0".to_string(),
            mean: [127.5; 3],
            scale: [1.0 / 128.0; 3],
            threads: 0,
        }
    }
}

/// Opens the configured inference engine.
///
/// `desc` is the model description (ncnn `.param`), `weights` the model
/// weights (ncnn `.bin`). Both must exist.
pub fn open_embedder(
    desc: &Path,
    weights: &Path,
    device: &str,
    opts: &EmbedderOptions,
) -> Result<Box<dyn FaceEmbedder>, EmbedError> {
    let device: Device = device.parse()?;
    for (what, p) in [("classifier description", desc), ("classifier weights", weights)] {
        if !p.is_file() {
            return Err(EmbedError::Config(format!("{what} {} not found", p.display())));
        }
    }
    if opts.dim == 0 || opts.input_size == 0 {
        return Err(EmbedError::Config("embedding size and input size must be positive".into()));
    }

    #[cfg(feature = "ncnn")]
    {
        let model = crate::model_ncnn::NcnnFaceModel::from_files(desc, weights, device, opts.clone())?;
        return Ok(Box::new(model));
    }

    #[cfg(not(feature = "ncnn"))]
    {
        let _ = device;
        return Err(EmbedError::Unavailable("built without the `ncnn` feature".into()));
    }
}
