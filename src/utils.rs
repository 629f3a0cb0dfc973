//! Utility functions for working with package-relative paths.

use std::path::{Component, Path, PathBuf};

/// Suffixes of Windows launchers that are not part of the command name.
const SCRIPT_SUFFIXES: &[&str] = &[".bat", ".cmd"];

/// The normal components of `path` as strings. Non UTF-8 components are
/// converted lossily.
pub fn segments(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}

/// The segments of the parent directory of `path` (empty for a bare file name).
pub fn parent_segments(path: &Path) -> Vec<String> {
    path.parent().map(segments).unwrap_or_default()
}

/// The part of `path` after the last parent segment equal to `segment`.
///
/// `lib/python3.11/site-packages/pkg/mod.py` split at `site-packages` yields
/// `pkg/mod.py`. Returns `None` if no parent segment matches.
pub fn after_last_segment(path: &Path, segment: &str) -> Option<PathBuf> {
    let parents = parent_segments(path);
    let position = parents.iter().rposition(|s| s == segment)?;
    let all = segments(path);
    Some(all[position + 1..].iter().collect())
}

/// Strip a Windows launcher suffix (`.bat`, `.cmd`) from a file name.
pub fn strip_script_suffix(file_name: &str) -> &str {
    SCRIPT_SUFFIXES
        .iter()
        .find_map(|suffix| file_name.strip_suffix(suffix))
        .unwrap_or(file_name)
}
