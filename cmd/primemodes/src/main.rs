//! primemodes - cluster face images by embedding mode.

mod config;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use facemodes_faceembed::{EmbedderOptions, FaceEmbedder, open_embedder};
use facemodes_primemodes::{DEFAULT_EMBEDDING_SIZE, PipelineConfig, Preset};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Embed a directory of faces, accumulate the vectors in a mode store and
/// copy every image into the directory of its nearest mode.
///
/// Single-dash long flags (`-faces dir`, `-peaks=false`) are accepted.
#[derive(Parser, Debug, Default)]
#[command(name = "primemodes")]
#[command(about = "Cluster face images by embedding mode")]
#[command(version)]
pub struct Args {
    /// Directory of face images (blank for none)
    #[arg(long, value_parser = config::path_or_blank)]
    pub faces: Option<PathBuf>,

    /// Descend into subdirectories of the faces directory
    #[arg(short, long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub recurse: Option<bool>,

    /// Classifier model description (ncnn .param)
    #[arg(long = "classifierDesc")]
    pub classifier_desc: Option<PathBuf>,

    /// Classifier model weights (ncnn .bin)
    #[arg(long = "classifierWeights")]
    pub classifier_weights: Option<PathBuf>,

    /// Inference device
    #[arg(long)]
    pub device: Option<String>,

    /// Maximum mode store nodes (0 = unbounded)
    #[arg(long)]
    pub nodes: Option<usize>,

    /// Write the mode store to this file (blank for none)
    #[arg(short, long, value_parser = config::path_or_blank)]
    pub output: Option<PathBuf>,

    /// Read the mode store from this file (blank for none)
    #[arg(short, long, value_parser = config::path_or_blank)]
    pub input: Option<PathBuf>,

    /// Image file extension, including the dot
    #[arg(long)]
    pub extension: Option<String>,

    /// Print the peak list as JSON to stdout
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub peaks: Option<bool>,

    /// Embedding cache file (JSON) (blank for none)
    #[arg(long, value_parser = config::path_or_blank)]
    pub embeddings: Option<PathBuf>,

    /// Create per-peak image copies under this directory (blank for none)
    #[arg(long, value_parser = config::path_or_blank)]
    pub clusters: Option<PathBuf>,

    /// Embedding size when no classifier decides it
    #[arg(long = "embedding-size", visible_alias = "embeddingSize")]
    pub embedding_size: Option<usize>,

    /// Reuse cached embeddings instead of running inference again
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub skip_cached: Option<bool>,

    /// Stop at the first image that fails to decode or embed
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub abort_on_item_error: Option<bool>,

    /// Defaults to start from: prime, cluster or parse
    #[arg(long)]
    pub preset: Option<Preset>,

    /// YAML file with pipeline settings, overridden by flags
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse_from(config::normalize_args(std::env::args_os()));
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let cfg = config::resolve(args)?;
    let engine = open_engine(&cfg)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = facemodes_primemodes::run(&cfg, engine, &mut out)?;

    if let Some(clusters) = &report.clusters {
        info!(copied = clusters.copied, bytes = clusters.bytes, "primemodes: cluster summary");
    }
    Ok(())
}

fn open_engine(cfg: &PipelineConfig) -> Result<Option<Box<dyn FaceEmbedder>>> {
    let Some((desc, weights)) = cfg.classifier() else {
        return Ok(None);
    };
    let opts = EmbedderOptions {
        dim: cfg.embedding_size.unwrap_or(DEFAULT_EMBEDDING_SIZE),
        ..Default::default()
    };
    let engine = open_embedder(desc, weights, &cfg.device, &opts)
        .with_context(|| format!("open classifier {}", desc.display()))?;
    Ok(Some(engine))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let argv = config::normalize_args(argv.iter().map(Into::into));
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn single_dash_long_flags() {
        let args = parse(&[
            "primemodes",
            "-faces",
            "imgs",
            "-classifierDesc",
            "m.param",
            "-classifierWeights=m.bin",
            "-nodes",
            "64",
            "-peaks=false",
            "-r",
            "-o",
            "out.multimodal",
        ]);
        assert_eq!(args.faces, Some(PathBuf::from("imgs")));
        assert_eq!(args.classifier_desc, Some(PathBuf::from("m.param")));
        assert_eq!(args.classifier_weights, Some(PathBuf::from("m.bin")));
        assert_eq!(args.nodes, Some(64));
        assert_eq!(args.peaks, Some(false));
        assert_eq!(args.recurse, Some(true));
        assert_eq!(args.output, Some(PathBuf::from("out.multimodal")));
    }

    #[test]
    fn bool_flags_stay_unset_when_absent() {
        let args = parse(&["primemodes", "--skip-cached"]);
        assert_eq!(args.skip_cached, Some(true));
        assert_eq!(args.peaks, None);
        assert_eq!(args.recurse, None);
        assert!(!args.verbose);
    }

    #[test]
    fn blank_path_flags_parse() {
        let args = parse(&["primemodes", "-preset", "prime", "-o", "", "-i", "", "-embeddings="]);
        assert_eq!(args.output, Some(PathBuf::new()));
        assert_eq!(args.input, Some(PathBuf::new()));
        assert_eq!(args.embeddings, Some(PathBuf::new()));
    }

    #[test]
    fn preset_flag() {
        let args = parse(&["primemodes", "-preset", "parse", "-i", "state.multimodal"]);
        assert_eq!(args.preset, Some(Preset::Parse));
        assert_eq!(args.input, Some(PathBuf::from("state.multimodal")));
    }

    #[test]
    fn no_classifier_no_engine() {
        assert!(open_engine(&PipelineConfig::default()).unwrap().is_none());
    }
}
