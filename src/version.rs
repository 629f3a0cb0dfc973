//! Stamp a version into a metadata file that carries a placeholder.
use fs_err as fs;
use std::path::{Path, PathBuf};

use crate::consts::VERSION_PLACEHOLDER;

/// Errors raised while updating the version
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("invalid version {0:?}: it must be non-empty, without whitespace or the placeholder")]
    InvalidVersion(String),

    #[error("failed to update {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Replace every placeholder in `content`, line by line.
///
/// Returns the new content and the number of replacements. Line endings and
/// all other text are kept as they are.
pub fn replace_placeholder(content: &str, version: &str) -> (String, usize) {
    let mut count = 0;
    let replaced = content
        .split_inclusive('\n')
        .map(|line| {
            let occurrences = line.matches(VERSION_PLACEHOLDER).count();
            if occurrences == 0 {
                return line.to_string();
            }
            count += occurrences;
            line.replace(VERSION_PLACEHOLDER, version)
        })
        .collect();
    (replaced, count)
}

/// Replace the version placeholder in the file at `path` with `version`.
///
/// Returns the number of replaced occurrences. The file is only written when
/// something was replaced, so running this twice leaves the file untouched
/// the second time.
pub fn update_version(path: &Path, version: &str) -> Result<usize, VersionError> {
    if version.is_empty()
        || version.chars().any(char::is_whitespace)
        || version.contains(VERSION_PLACEHOLDER)
    {
        return Err(VersionError::InvalidVersion(version.to_string()));
    }

    let io_error = |source| VersionError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = fs::read_to_string(path).map_err(io_error)?;
    let (replaced, count) = replace_placeholder(&content, version);

    if count > 0 {
        fs::write(path, replaced).map_err(io_error)?;
        tracing::info!(
            "Set version {} in {} ({} occurrences)",
            version,
            path.display(),
            count
        );
    } else {
        tracing::warn!("No {} placeholder found in {}", VERSION_PLACEHOLDER, path.display());
    }
    Ok(count)
}
