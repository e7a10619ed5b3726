//! Nearest-peak assignment and per-peak image copies.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use facemodes_multimodal::{Peak, l2_distance};
use tracing::{debug, info};

use crate::cache::EmbeddingCache;
use crate::error::PipelineError;

/// Returns the index of the peak closest to `v` by L2 distance.
///
/// Only a strictly smaller distance displaces the current best, so among
/// equidistant peaks the earliest one wins. `None` iff `peaks` is empty.
pub fn nearest_peak(v: &[f32], peaks: &[Peak]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, p) in peaks.iter().enumerate() {
        let d = l2_distance(v, &p.mean);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// One cache entry and the peak it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment<'a> {
    pub path: &'a str,
    /// Index into the peak list.
    pub peak: usize,
}

/// Assigns every cache entry to its nearest peak, in cache order.
pub fn assign<'a>(cache: &'a EmbeddingCache, peaks: &[Peak]) -> Vec<Assignment<'a>> {
    cache
        .iter()
        .filter_map(|(path, v)| nearest_peak(v, peaks).map(|peak| Assignment { path, peak }))
        .collect()
}

/// What [`materialize`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeReport {
    /// True if there were no peaks, in which case nothing was created.
    pub skipped: bool,
    pub copied: usize,
    pub bytes: u64,
    /// Copied files per peak id.
    pub per_peak: BTreeMap<u64, usize>,
}

/// Directory holding the copies for `peak`.
pub fn peak_dir(root: &Path, peak: &Peak) -> PathBuf {
    root.join(peak.id.to_string())
}

/// Creates `root` and copies every cached image into the directory of its
/// nearest peak as `image<n><ext>`, `n` counting up from 0 across the run.
///
/// `root` must not exist yet. With an empty peak list nothing is created.
pub fn materialize(
    cache: &EmbeddingCache,
    peaks: &[Peak],
    root: &Path,
    ext: &str,
) -> Result<MaterializeReport, PipelineError> {
    let mut report = MaterializeReport::default();
    if peaks.is_empty() {
        info!(root = %root.display(), "primemodes: no peaks, skipping clusters");
        report.skipped = true;
        return Ok(report);
    }
    if let Some(dim) = peaks.first().map(|p| p.mean.len()) {
        cache.check_dimension(dim)?;
    }

    fs::create_dir(root).map_err(|source| PipelineError::CreateDir {
        path: root.to_path_buf(),
        source,
    })?;

    for (n, a) in assign(cache, peaks).into_iter().enumerate() {
        let peak = &peaks[a.peak];
        let (_, bytes) = place(root, peak, n, Path::new(a.path), ext)?;
        report.copied += 1;
        report.bytes += bytes;
        *report.per_peak.entry(peak.id).or_default() += 1;
    }

    info!(
        root = %root.display(),
        copied = report.copied,
        peaks = report.per_peak.len(),
        "primemodes: clusters written"
    );
    Ok(report)
}

/// Copies `src` to `<root>/<peak id>/image<n><ext>`, creating the peak
/// directory if needed. Returns the destination and its length.
pub fn place(root: &Path, peak: &Peak, n: usize, src: &Path, ext: &str) -> Result<(PathBuf, u64), PipelineError> {
    let dir = peak_dir(root, peak);
    fs::create_dir_all(&dir).map_err(|source| PipelineError::CreateDir {
        path: dir.clone(),
        source,
    })?;
    let dest = dir.join(format!("image{n}{ext}"));
    let bytes = copy_verified(src, &dest)?;
    debug!(from = %src.display(), to = %dest.display(), peak = peak.id, bytes, "primemodes: copied");
    Ok((dest, bytes))
}

/// Reads all of `from`, writes it to `to` and checks the written length.
pub fn copy_verified(from: &Path, to: &Path) -> Result<u64, PipelineError> {
    let copy_err = |source| PipelineError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };

    let data = fs::read(from).map_err(copy_err)?;
    let mut file = File::create(to).map_err(copy_err)?;
    file.write_all(&data).map_err(copy_err)?;
    file.flush().map_err(copy_err)?;
    drop(file);

    let expected = data.len() as u64;
    let written = fs::metadata(to).map_err(copy_err)?.len();
    if written != expected {
        return Err(PipelineError::ShortCopy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
            expected,
            written,
        });
    }
    Ok(written)
}
