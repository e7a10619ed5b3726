//! One-shot pipeline driver.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use facemodes_faceembed::FaceEmbedder;
use facemodes_multimodal::{ModeStore, MultiModal, Peak};
use tracing::info;

use crate::assign::{MaterializeReport, materialize};
use crate::cache::EmbeddingCache;
use crate::config::{DEFAULT_EMBEDDING_SIZE, PipelineConfig};
use crate::error::{PipelineError, mode_io};
use crate::extract::{ExtractOptions, ExtractReport, extract};
use crate::walk::discover;

/// Summary of a completed [`run`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Embedding size the run used.
    pub dimension: usize,
    /// True if the mode store was read from `cfg.input`.
    pub loaded_store: bool,
    pub extract: Option<ExtractReport>,
    pub cache_entries: usize,
    pub peaks: Vec<Peak>,
    pub clusters: Option<MaterializeReport>,
}

/// Runs the configured pipeline once.
///
/// Stages, in order: open the mode store and embedding cache, extract
/// embeddings from `cfg.faces`, release `engine`, save the store and the
/// cache, print the peaks to `peaks_out`, then write the cluster tree.
/// Outputs saved before a later failure stay on disk.
///
/// `engine` is required when `cfg.faces` is set.
pub fn run(
    cfg: &PipelineConfig,
    engine: Option<Box<dyn FaceEmbedder>>,
    peaks_out: &mut dyn Write,
) -> Result<RunReport, PipelineError> {
    cfg.validate()?;
    if cfg.faces.is_some() && engine.is_none() {
        return Err(PipelineError::Config(
            "a faces directory needs a classifier (description and weights)".into(),
        ));
    }

    let mut cache = match &cfg.embeddings {
        Some(path) => EmbeddingCache::load(path)?,
        None => EmbeddingCache::new(),
    };

    let dim = match resolve_dimension(cfg, engine.as_deref())? {
        Some(dim) => Some(dim),
        None if cfg.input.is_none() => cache.dimension()?,
        None => None,
    };
    let (mut store, loaded_store) = open_store(cfg, dim)?;
    let dim = store.dim();
    cache.check_dimension(dim)?;

    let mut extracted = None;
    if let (Some(faces), Some(embedder)) = (&cfg.faces, engine.as_deref()) {
        let paths = discover(faces, &cfg.extension, cfg.recurse)?;
        info!(faces = %faces.display(), images = paths.len(), "primemodes: extracting");
        let opts = ExtractOptions {
            cache_policy: cfg.cache_policy,
            item_errors: cfg.item_errors,
            progress_interval: cfg.progress_interval,
            reinsert_cached: !loaded_store,
        };
        extracted = Some(extract(&paths, embedder, &mut store, &mut cache, &opts)?);
    }
    drop(engine);

    if let Some(out) = &cfg.output {
        save_store(&store, out)?;
    }
    if let Some(path) = &cfg.embeddings {
        cache.save(path)?;
    }

    let peaks = store.peaks();
    if cfg.peaks {
        write_peaks(peaks_out, &peaks)?;
    }

    let clusters = match &cfg.clusters {
        Some(root) => Some(materialize(&cache, &peaks, root, &cfg.extension)?),
        None => None,
    };

    info!(
        dim,
        nodes = store.len(),
        peaks = peaks.len(),
        cached = cache.len(),
        "primemodes: done"
    );
    Ok(RunReport {
        dimension: dim,
        loaded_store,
        extract: extracted,
        cache_entries: cache.len(),
        peaks,
        clusters,
    })
}

/// Returns the embedding size pinned by the engine or the configuration.
///
/// The two must agree when both are known. `None` means neither decides,
/// in which case a loaded store's dimension, then the cache's, then the
/// default applies.
pub fn resolve_dimension(
    cfg: &PipelineConfig,
    engine: Option<&dyn FaceEmbedder>,
) -> Result<Option<usize>, PipelineError> {
    match (engine.map(|e| e.embedding_size()), cfg.embedding_size) {
        (Some(0), _) => Err(PipelineError::Config("classifier reports embedding size 0".into())),
        (Some(e), Some(c)) if e != c => Err(PipelineError::Config(format!(
            "classifier produces {e}-dimensional embeddings, configured size is {c}"
        ))),
        (Some(e), _) => Ok(Some(e)),
        (None, c) => Ok(c),
    }
}

/// Opens the mode store named by `cfg.input`, or a fresh one.
///
/// A configured input that cannot be opened is fatal. Returns the store and
/// whether it was read from disk.
pub fn open_store(cfg: &PipelineConfig, dim: Option<usize>) -> Result<(MultiModal, bool), PipelineError> {
    let fresh = || MultiModal::new(dim.unwrap_or(DEFAULT_EMBEDDING_SIZE), cfg.max_nodes);

    let Some(input) = &cfg.input else {
        return Ok((fresh(), false));
    };
    let context = || format!("read {}", input.display());
    let file = File::open(input).map_err(|e| mode_io(context(), e))?;

    let mut r = BufReader::new(file);
    let store = match dim {
        Some(dim) => {
            let mut store = MultiModal::new(dim, cfg.max_nodes);
            store.read_from(&mut r).map(|_| store)
        }
        None => MultiModal::read(&mut r, cfg.max_nodes),
    }
    .map_err(|source| PipelineError::ModeStore {
        context: context(),
        source,
    })?;

    info!(
        input = %input.display(),
        dim = store.dim(),
        nodes = store.len(),
        "primemodes: mode store loaded"
    );
    Ok((store, true))
}

fn save_store(store: &dyn ModeStore, out: &Path) -> Result<(), PipelineError> {
    let context = || format!("write {}", out.display());
    let file = File::create(out).map_err(|e| mode_io(context(), e))?;
    let mut w = BufWriter::new(file);
    let written = store.write_to(&mut w).map_err(|source| PipelineError::ModeStore {
        context: context(),
        source,
    })?;
    w.flush().map_err(|e| mode_io(context(), e))?;
    info!(output = %out.display(), bytes = written, "primemodes: mode store saved");
    Ok(())
}

fn write_peaks(w: &mut dyn Write, peaks: &[Peak]) -> Result<(), PipelineError> {
    serde_json::to_writer_pretty(&mut *w, peaks).map_err(PipelineError::Peaks)?;
    let io = |e| PipelineError::Peaks(serde_json::Error::io(e));
    w.write_all(b"\n").map_err(io)?;
    w.flush().map_err(io)
}
