use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use walkdir::WalkDir;

/// List files under `root` whose extension is exactly `extension`.
///
/// Results are sorted so repeated calls over an unchanged directory return the
/// same ordered set. Only the top level is scanned unless `recursive` is set.
pub fn discover_replays(root: &Path, extension: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("input directory '{}' does not exist", root.display());
    }
    let mut walker = WalkDir::new(root).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some(extension) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}
