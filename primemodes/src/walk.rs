use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::PipelineError;

/// Lists the regular files under `root` whose extension is exactly `ext`.
///
/// Entries are returned in walk order with siblings sorted by file name.
/// Any error while walking, including a missing root, is fatal.
pub fn discover(root: &Path, ext: &str, recurse: bool) -> Result<Vec<PathBuf>, PipelineError> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if !recurse {
        walker = walker.max_depth(1);
    }

    let mut found = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|source| PipelineError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if has_extension(entry.path(), ext) {
            found.push(entry.into_path());
        }
    }
    debug!(root = %root.display(), ext, count = found.len(), "primemodes: discovered images");
    Ok(found)
}

/// Reports whether the final path component ends in `ext`, counted from
/// its last dot. The comparison is case-sensitive.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.as_encoded_bytes();
    match name.iter().rposition(|&b| b == b'.') {
        Some(dot) => &name[dot..] == ext.as_bytes(),
        None => false,
    }
}
