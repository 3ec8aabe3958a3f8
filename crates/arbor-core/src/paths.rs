//! Path helpers for persisted state.
//!
//! Persisted dependency state stores paths relative to the project root,
//! `/`-separated, so a state file written on one platform loads on another.

use std::path::{Component, Path, PathBuf};

/// Converts `path` to a `/`-separated string relative to `root`.
///
/// Returns `None` when `path` is not under `root` or contains segments that
/// are not valid UTF-8.
pub fn to_portable_relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in rel.components() {
        let Component::Normal(part) = component else {
            return None;
        };
        let part = part.to_str()?;
        if !out.is_empty() {
            out.push('/');
        }
        out.push_str(part);
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Resolves a `/`-separated relative string back to an absolute path under `root`.
pub fn from_portable_relative(root: &Path, rel: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for part in rel.split('/').filter(|p| !p.is_empty()) {
        path.push(part);
    }
    path
}
