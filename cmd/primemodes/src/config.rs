//! Flag normalisation and config layering.

use std::convert::Infallible;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use facemodes_primemodes::{CachePolicy, ItemErrorPolicy, PipelineConfig};
use serde_yaml::Value;

use crate::Args;

/// Long flag names also accepted with a single dash.
const LONG_FLAGS: &[&str] = &[
    "faces",
    "recurse",
    "classifierDesc",
    "classifierWeights",
    "device",
    "nodes",
    "output",
    "input",
    "extension",
    "peaks",
    "embeddings",
    "clusters",
    "embedding-size",
    "embeddingSize",
    "skip-cached",
    "abort-on-item-error",
    "preset",
    "config",
    "verbose",
];

/// Rewrites `-name` and `-name=value` to their `--` form for every known
/// long flag. Arguments after a bare `--` are left alone.
pub fn normalize_args(argv: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    let mut out = Vec::new();
    let mut passthrough = false;
    for arg in argv {
        if passthrough {
            out.push(arg);
            continue;
        }
        let Some(s) = arg.to_str() else {
            out.push(arg);
            continue;
        };
        if s == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        match s.strip_prefix('-') {
            Some(rest) if !rest.starts_with('-') => {
                let name = rest.split_once('=').map_or(rest, |(n, _)| n);
                if LONG_FLAGS.contains(&name) {
                    out.push(format!("-{s}").into());
                } else {
                    out.push(arg);
                }
            }
            _ => out.push(arg),
        }
    }
    out
}

/// Path flag parser that also accepts an empty value.
pub fn path_or_blank(s: &str) -> Result<PathBuf, Infallible> {
    Ok(PathBuf::from(s))
}

/// An empty path flag clears the setting.
fn non_blank(p: &Path) -> Option<PathBuf> {
    (!p.as_os_str().is_empty()).then(|| p.to_path_buf())
}

/// Builds the run configuration: preset defaults, then the YAML file, then
/// flags.
pub fn resolve(args: &Args) -> Result<PipelineConfig> {
    let mut cfg = args.preset.unwrap_or_default().config();
    if let Some(path) = &args.config {
        cfg = merge_yaml(&cfg, path)?;
    }
    apply_flags(&mut cfg, args);
    Ok(cfg)
}

fn merge_yaml(base: &PipelineConfig, path: &Path) -> Result<PipelineConfig> {
    let text = fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let overlay: Value =
        serde_yaml::from_str(&text).with_context(|| format!("parse config {}", path.display()))?;

    let mut merged = serde_yaml::to_value(base).context("encode config defaults")?;
    match (overlay, &mut merged) {
        (Value::Null, _) => {}
        (Value::Mapping(over), Value::Mapping(dst)) => {
            for (k, v) in over {
                dst.insert(k, v);
            }
        }
        _ => bail!("config {}: expected a mapping at the top level", path.display()),
    }
    serde_yaml::from_value(merged).with_context(|| format!("config {}", path.display()))
}

fn apply_flags(cfg: &mut PipelineConfig, args: &Args) {
    if let Some(v) = &args.faces {
        cfg.faces = non_blank(v);
    }
    if let Some(v) = args.recurse {
        cfg.recurse = v;
    }
    if let Some(v) = &args.classifier_desc {
        cfg.classifier_desc = Some(v.clone());
    }
    if let Some(v) = &args.classifier_weights {
        cfg.classifier_weights = Some(v.clone());
    }
    if let Some(v) = &args.device {
        cfg.device = v.clone();
    }
    if let Some(v) = args.nodes {
        cfg.max_nodes = v;
    }
    if let Some(v) = &args.output {
        cfg.output = non_blank(v);
    }
    if let Some(v) = &args.input {
        cfg.input = non_blank(v);
    }
    if let Some(v) = &args.extension {
        cfg.extension = v.clone();
    }
    if let Some(v) = args.peaks {
        cfg.peaks = v;
    }
    if let Some(v) = &args.embeddings {
        cfg.embeddings = non_blank(v);
    }
    if let Some(v) = &args.clusters {
        cfg.clusters = non_blank(v);
    }
    if let Some(v) = args.embedding_size {
        cfg.embedding_size = Some(v);
    }
    if let Some(v) = args.skip_cached {
        cfg.cache_policy = if v { CachePolicy::SkipCached } else { CachePolicy::Refresh };
    }
    if let Some(v) = args.abort_on_item_error {
        cfg.item_errors = if v { ItemErrorPolicy::Abort } else { ItemErrorPolicy::Skip };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use facemodes_primemodes::{DEFAULT_MAX_NODES, Preset};

    fn os(v: &[&str]) -> Vec<OsString> {
        v.iter().map(OsString::from).collect()
    }

    #[test]
    fn normalises_known_single_dash_flags() {
        let got = normalize_args(os(&[
            "primemodes",
            "-faces",
            "imgs",
            "-peaks=false",
            "-r",
            "--device",
            "CPU",
            "-unknown",
            "--",
            "-faces",
        ]));
        assert_eq!(
            got,
            os(&[
                "primemodes",
                "--faces",
                "imgs",
                "--peaks=false",
                "-r",
                "--device",
                "CPU",
                "-unknown",
                "--",
                "-faces",
            ])
        );
    }

    #[test]
    fn flags_override_preset() {
        let args = Args {
            preset: Some(Preset::Prime),
            nodes: Some(12),
            peaks: Some(false),
            skip_cached: Some(true),
            abort_on_item_error: Some(true),
            ..Default::default()
        };
        let cfg = resolve(&args).unwrap();
        assert_eq!(cfg.output, Preset::Prime.config().output);
        assert_eq!(cfg.max_nodes, 12);
        assert!(!cfg.peaks);
        assert_eq!(cfg.cache_policy, CachePolicy::SkipCached);
        assert_eq!(cfg.item_errors, ItemErrorPolicy::Abort);
    }

    #[test]
    fn blank_paths_clear_preset_values() {
        let argv = normalize_args(os(&[
            "primemodes",
            "-preset",
            "prime",
            "-o",
            "",
            "-i",
            "",
            "-embeddings",
            "",
            "-clusters=",
            "-faces",
            "",
        ]));
        let args = Args::try_parse_from(argv).unwrap();
        assert!(Preset::Prime.config().output.is_some());

        let cfg = resolve(&args).unwrap();
        assert_eq!(cfg.output, None);
        assert_eq!(cfg.input, None);
        assert_eq!(cfg.embeddings, None);
        assert_eq!(cfg.clusters, None);
        assert_eq!(cfg.faces, None);
    }

    #[test]
    fn yaml_sits_between_preset_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primemodes.yaml");
        fs::write(
            &path,
            "faces: /data/faces\nextension: .jpeg\nmax_nodes: 256\ncache_policy: skip_cached\n",
        )
        .unwrap();

        let args = Args {
            config: Some(path),
            nodes: Some(32),
            ..Default::default()
        };
        let cfg = resolve(&args).unwrap();
        assert_eq!(cfg.faces, Some(PathBuf::from("/data/faces")));
        assert_eq!(cfg.extension, ".jpeg");
        assert_eq!(cfg.max_nodes, 32);
        assert_eq!(cfg.cache_policy, CachePolicy::SkipCached);
        assert!(cfg.recurse);
    }

    #[test]
    fn empty_yaml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "").unwrap();

        let cfg = resolve(&Args {
            config: Some(path),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(cfg.max_nodes, DEFAULT_MAX_NODES);
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn yaml_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typo.yaml");
        fs::write(&path, "facez: /data\n").unwrap();

        let err = resolve(&Args {
            config: Some(path),
            ..Default::default()
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("facez"), "got {err:#}");
    }
}
