//! Image -> embedding stage.

use std::path::{Path, PathBuf};

use facemodes_faceembed::{EmbedError, FaceEmbedder, decode_jpeg};
use facemodes_multimodal::{ModeError, ModeStore};
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::config::{CachePolicy, ItemErrorPolicy};
use crate::error::{ItemError, PipelineError};

/// Knobs for [`extract`].
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub cache_policy: CachePolicy,
    pub item_errors: ItemErrorPolicy,
    /// Log progress every this many images (0 disables progress logs).
    pub progress_interval: usize,
    /// Under [`CachePolicy::SkipCached`], feed cached vectors into the
    /// store. Needed when the store did not come from a previous run.
    pub reinsert_cached: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            cache_policy: CachePolicy::Refresh,
            item_errors: ItemErrorPolicy::Skip,
            progress_interval: 100,
            reinsert_cached: true,
        }
    }
}

/// Outcome counts of an [`extract`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    pub discovered: usize,
    /// Images run through inference and inserted.
    pub embedded: usize,
    /// Images served from the cache.
    pub reused: usize,
    /// Images left out after a per-item error.
    pub failed: Vec<PathBuf>,
}

enum Outcome {
    Embedded,
    Reused,
}

/// Embeds every path in order, inserting each vector into `store` and
/// recording it in `cache`.
///
/// Decode and inference failures are per-item: with
/// [`ItemErrorPolicy::Skip`] the image is logged and left out of both
/// `store` and `cache`. Store failures, including a dimension mismatch, are
/// always fatal.
pub fn extract(
    paths: &[PathBuf],
    embedder: &dyn FaceEmbedder,
    store: &mut dyn ModeStore,
    cache: &mut EmbeddingCache,
    opts: &ExtractOptions,
) -> Result<ExtractReport, PipelineError> {
    let mut report = ExtractReport {
        discovered: paths.len(),
        ..Default::default()
    };

    for (i, path) in paths.iter().enumerate() {
        if opts.progress_interval > 0 && i % opts.progress_interval == 0 {
            info!(total = paths.len(), "primemodes: image #{i}");
        }

        match extract_one(path, embedder, store, cache, opts) {
            Ok(Outcome::Embedded) => report.embedded += 1,
            Ok(Outcome::Reused) => report.reused += 1,
            Err(PipelineError::Item(e)) if opts.item_errors == ItemErrorPolicy::Skip => {
                warn!(path = %path.display(), error = %e, "primemodes: skipping image");
                report.failed.push(path.clone());
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        discovered = report.discovered,
        embedded = report.embedded,
        reused = report.reused,
        failed = report.failed.len(),
        "primemodes: extraction done"
    );
    Ok(report)
}

fn extract_one(
    path: &Path,
    embedder: &dyn FaceEmbedder,
    store: &mut dyn ModeStore,
    cache: &mut EmbeddingCache,
    opts: &ExtractOptions,
) -> Result<Outcome, PipelineError> {
    let key = path.to_str().ok_or_else(|| ItemError::Path(path.to_path_buf()))?;

    if opts.cache_policy == CachePolicy::SkipCached {
        if let Some(cached) = cache.get(key) {
            if opts.reinsert_cached {
                insert(store, path, cached)?;
            }
            return Ok(Outcome::Reused);
        }
    }

    let image = decode_jpeg(path).map_err(ItemError::Decode)?;
    let vector = match embedder.embed(&image) {
        Ok(v) => v,
        Err(EmbedError::DimensionMismatch { expected, got }) => {
            return Err(PipelineError::ModeStore {
                context: format!("embedding {}", path.display()),
                source: ModeError::DimensionMismatch { expected, got },
            });
        }
        Err(source) => {
            return Err(ItemError::Inference {
                path: path.to_path_buf(),
                source,
            }
            .into());
        }
    };
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(ItemError::Inference {
            path: path.to_path_buf(),
            source: EmbedError::Model("embedding has non-finite components".into()),
        }
        .into());
    }

    insert(store, path, &vector)?;
    cache.insert(key, vector);
    Ok(Outcome::Embedded)
}

fn insert(store: &mut dyn ModeStore, path: &Path, v: &[f32]) -> Result<(), PipelineError> {
    store.insert(v).map_err(|source| PipelineError::ModeStore {
        context: format!("insert {}", path.display()),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facemodes_faceembed::RgbImage;
    use facemodes_multimodal::MultiModal;
    use image::{ImageFormat, Rgb};

    /// Maps bright images to `[10, 10]`, dark ones to `[0, 0]` and fails
    /// on mid-grey.
    struct Brightness;

    impl FaceEmbedder for Brightness {
        fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, EmbedError> {
            match image.get_pixel(0, 0)[0] {
                0..=63 => Ok(vec![0.0, 0.0]),
                192.. => Ok(vec![10.0, 10.0]),
                _ => Err(EmbedError::Model("no face".into())),
            }
        }

        fn embedding_size(&self) -> usize {
            2
        }
    }

    struct Wide;

    impl FaceEmbedder for Wide {
        fn embed(&self, _image: &RgbImage) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![0.0; 3])
        }

        fn embedding_size(&self) -> usize {
            3
        }
    }

    fn write_jpeg(path: &Path, level: u8) {
        RgbImage::from_pixel(8, 8, Rgb([level; 3]))
            .save_with_format(path, ImageFormat::Jpeg)
            .unwrap();
    }

    fn key(p: &Path) -> &str {
        p.to_str().unwrap()
    }

    #[test]
    fn embeds_inserts_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        write_jpeg(&a, 10);
        write_jpeg(&b, 250);

        let mut store = MultiModal::new(2, 16);
        let mut cache = EmbeddingCache::new();
        let report = extract(
            &[a.clone(), b.clone()],
            &Brightness,
            &mut store,
            &mut cache,
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(report.embedded, 2);
        assert!(report.failed.is_empty());
        assert_eq!(store.inserted(), 2);
        assert_eq!(cache.get(key(&a)), Some(&[0.0f32, 0.0][..]));
        assert_eq!(cache.get(key(&b)), Some(&[10.0f32, 10.0][..]));
    }

    #[test]
    fn per_item_errors_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.jpg");
        let grey = dir.path().join("grey.jpg");
        let junk = dir.path().join("junk.jpg");
        write_jpeg(&good, 0);
        write_jpeg(&grey, 128);
        std::fs::write(&junk, b"not an image").unwrap();

        let mut store = MultiModal::new(2, 16);
        let mut cache = EmbeddingCache::new();
        let report = extract(
            &[junk.clone(), grey.clone(), good.clone()],
            &Brightness,
            &mut store,
            &mut cache,
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!(report.embedded, 1);
        assert_eq!(report.failed, [junk.clone(), grey.clone()]);
        assert_eq!(store.inserted(), 1);
        assert!(!cache.contains(key(&junk)));
        assert!(!cache.contains(key(&grey)));
        assert!(cache.contains(key(&good)));
    }

    #[test]
    fn abort_policy_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let junk = dir.path().join("junk.jpg");
        let good = dir.path().join("good.jpg");
        std::fs::write(&junk, b"not an image").unwrap();
        write_jpeg(&good, 0);

        let mut store = MultiModal::new(2, 16);
        let mut cache = EmbeddingCache::new();
        let opts = ExtractOptions {
            item_errors: ItemErrorPolicy::Abort,
            ..Default::default()
        };
        let err = extract(&[junk, good], &Brightness, &mut store, &mut cache, &opts).unwrap_err();

        assert!(matches!(err, PipelineError::Item(ItemError::Decode(_))), "got {err}");
        assert!(cache.is_empty());
    }

    #[test]
    fn dimension_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        write_jpeg(&a, 0);

        let mut store = MultiModal::new(2, 16);
        let mut cache = EmbeddingCache::new();
        let err = extract(&[a], &Wide, &mut store, &mut cache, &ExtractOptions::default()).unwrap_err();

        assert!(
            matches!(
                err,
                PipelineError::ModeStore {
                    source: ModeError::DimensionMismatch { expected: 2, got: 3 },
                    ..
                }
            ),
            "got {err}"
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn refresh_overwrites_cached_entry() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        write_jpeg(&a, 255);

        let mut store = MultiModal::new(2, 16);
        let mut cache: EmbeddingCache = [(key(&a).to_string(), vec![5.0, 5.0])].into_iter().collect();
        let report = extract(
            &[a.clone()],
            &Brightness,
            &mut store,
            &mut cache,
            &ExtractOptions::default(),
        )
        .unwrap();

        assert_eq!((report.embedded, report.reused), (1, 0));
        assert_eq!(cache.get(key(&a)), Some(&[10.0f32, 10.0][..]));
    }

    #[test]
    fn skip_cached_reuses_entry() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        // Unreadable on purpose: a cache hit must not touch the file.
        std::fs::write(&a, b"not an image").unwrap();

        let mut cache: EmbeddingCache = [(key(&a).to_string(), vec![5.0, 5.0])].into_iter().collect();
        let mut opts = ExtractOptions {
            cache_policy: CachePolicy::SkipCached,
            ..Default::default()
        };

        let mut store = MultiModal::new(2, 16);
        let report = extract(&[a.clone()], &Brightness, &mut store, &mut cache, &opts).unwrap();
        assert_eq!((report.embedded, report.reused), (0, 1));
        assert_eq!(store.inserted(), 1);
        assert_eq!(cache.get(key(&a)), Some(&[5.0f32, 5.0][..]));

        opts.reinsert_cached = false;
        let mut store = MultiModal::new(2, 16);
        extract(&[a], &Brightness, &mut store, &mut cache, &opts).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn empty_input() {
        let mut store = MultiModal::new(2, 16);
        let mut cache = EmbeddingCache::new();
        let report = extract(&[], &Brightness, &mut store, &mut cache, &ExtractOptions::default()).unwrap();
        assert_eq!(report, ExtractReport::default());
    }
}
