use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageFormat, RgbImage};

use crate::EmbedError;

/// Opens `path` and decodes it as a JPEG into 8-bit RGB.
///
/// The format is fixed: a file with another encoding fails with
/// [`EmbedError::Decode`] whatever its extension says.
pub fn decode_jpeg(path: &Path) -> Result<RgbImage, EmbedError> {
    let file = File::open(path).map_err(|source| EmbedError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let img = image::load(BufReader::new(file), ImageFormat::Jpeg).map_err(|e| EmbedError::Decode {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })?;
    Ok(img.to_rgb8())
}

/// Resizes `img` to `width x height` and lays it out channel-planar
/// (all R, then all G, then all B) as `(p - mean[c]) * scale[c]`.
pub fn to_planar(img: &RgbImage, width: u32, height: u32, mean: [f32; 3], scale: [f32; 3]) -> Vec<f32> {
    let resized;
    let src = if img.width() == width && img.height() == height {
        img
    } else {
        resized = imageops::resize(img, width, height, FilterType::Triangle);
        &resized
    };

    let plane = (width * height) as usize;
    let mut out = vec![0.0f32; plane * 3];
    for (i, px) in src.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (px[c] as f32 - mean[c]) * scale[c];
        }
    }
    out
}
