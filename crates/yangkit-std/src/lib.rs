//! yangkit-std: filesystem glue for yangkit
//!
//! Provides the search-directory module locator used by
//! [`yangkit_core::context::Context`] and a helper to collect YIN files
//! from a directory tree.

use std::fs;
use std::path::{Path, PathBuf};

pub use yangkit_core;

use yangkit_core::context::ModuleLocator;

/// Filesystem locator following the module filename convention:
/// `<name>.yin` or `<name>@<revision>.yin` in the search directory.
///
/// With no revision requested, an exact `<name>.yin` wins; otherwise the
/// lexicographically newest `<name>@<revision>.yin` is chosen.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsLocator;

impl FsLocator {
    /// Create a new filesystem locator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ModuleLocator for FsLocator {
    fn locate(
        &self,
        searchpath: Option<&str>,
        name: &str,
        revision: Option<&str>,
    ) -> Result<Option<String>, String> {
        let Some(dir) = searchpath else {
            return Ok(None);
        };
        let dir = Path::new(dir);

        if let Some(revision) = revision {
            let path = dir.join(format!("{name}@{revision}.yin"));
            return read_if_file(&path);
        }

        let exact = dir.join(format!("{name}.yin"));
        if exact.is_file() {
            return read_if_file(&exact);
        }

        // newest revision among name@YYYY-MM-DD.yin
        let mut best: Option<PathBuf> = None;
        let entries = fs::read_dir(dir).map_err(|e| e.to_string())?;
        let prefix = format!("{name}@");
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|f| f.to_str()) else {
                continue;
            };
            let Some(stem) = file_name.strip_suffix(".yin") else {
                continue;
            };
            let Some(rev) = stem.strip_prefix(&prefix) else {
                continue;
            };
            if !is_revision_date(rev) {
                continue;
            }
            if best
                .as_ref()
                .and_then(|b| b.file_name().and_then(|f| f.to_str()))
                .is_none_or(|cur| file_name > cur)
            {
                best = Some(path);
            }
        }
        match best {
            Some(path) => read_if_file(&path),
            None => Ok(None),
        }
    }
}

fn read_if_file(path: &Path) -> Result<Option<String>, String> {
    if !path.is_file() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// `\d{4}-\d{2}-\d{2}`
fn is_revision_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && [0, 1, 2, 3, 5, 6, 8, 9]
            .iter()
            .all(|&i| bytes[i].is_ascii_digit())
}

/// Recursively collect YIN files from a directory.
#[must_use]
pub fn collect_yin_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    collect_files_recursive(dir, &mut files);
    files
}

fn collect_files_recursive(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_files_recursive(&path, files);
            } else if path.is_file() {
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if ext.eq_ignore_ascii_case("yin") {
                    files.push(path);
                }
            }
        }
    }
}
