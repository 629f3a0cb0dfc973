//! Reading and cross-checking the file manifests of an extracted conda package.
use fs_err as fs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::consts::{INFO_FILES, INFO_PATHS_JSON};

/// Errors raised while loading a package manifest
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("info/files and info/paths.json are inconsistent: {0}")]
    Inconsistent(Inconsistency),
}

/// The first difference found between the two manifest lists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Inconsistency {
    #[error("{files} entries in the file list but {paths} path records")]
    Length { files: usize, paths: usize },

    #[error("entry {index} differs after sorting: {file:?} != {path:?}")]
    Entry {
        index: usize,
        file: String,
        path: String,
    },
}

#[derive(Debug, Deserialize)]
struct PathsJson {
    paths: Vec<PathsEntry>,
}

/// One record of `info/paths.json`. Only the relative path is used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsEntry {
    /// Path relative to the package root, always with forward slashes
    #[serde(rename = "_path")]
    pub relative_path: String,
}

/// The validated pair of manifests of one extracted package.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    root: PathBuf,
    files: Vec<String>,
    entries: Vec<PathsEntry>,
}

impl PackageManifest {
    /// Read `info/files` and `info/paths.json` below `root` and check that they
    /// describe the same set of paths.
    pub fn from_package_directory(root: &Path) -> Result<Self, ManifestError> {
        let files = fs::read_to_string(root.join(INFO_FILES))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect::<Vec<_>>();

        let paths_json_path = root.join(INFO_PATHS_JSON);
        let paths_json: PathsJson =
            serde_json::from_str(&fs::read_to_string(&paths_json_path)?).map_err(|source| {
                ManifestError::Parse {
                    path: paths_json_path.clone(),
                    source,
                }
            })?;

        let manifest = Self {
            root: root.to_path_buf(),
            files,
            entries: paths_json.paths,
        };
        manifest.check_consistency().map_err(ManifestError::Inconsistent)?;

        tracing::debug!(
            "Loaded manifest of {} with {} entries",
            root.display(),
            manifest.len()
        );
        Ok(manifest)
    }

    fn check_consistency(&self) -> Result<(), Inconsistency> {
        if self.files.len() != self.entries.len() {
            return Err(Inconsistency::Length {
                files: self.files.len(),
                paths: self.entries.len(),
            });
        }

        let mut files = self.files.iter().map(String::as_str).collect::<Vec<_>>();
        let mut paths = self
            .entries
            .iter()
            .map(|entry| entry.relative_path.trim())
            .collect::<Vec<_>>();
        files.sort_unstable();
        paths.sort_unstable();

        for (index, (file, path)) in files.iter().zip(paths.iter()).enumerate() {
            if file != path {
                return Err(Inconsistency::Entry {
                    index,
                    file: file.to_string(),
                    path: path.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Root directory of the extracted package
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path records in `paths.json` order
    pub fn entries(&self) -> &[PathsEntry] {
        &self.entries
    }

    /// Number of files listed in the manifest
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns true if the package contains no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
