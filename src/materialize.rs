//! Copy classified files into the output layout.
//!
//! Existing files at a destination are overwritten, but files left over from
//! an earlier run are never removed. Converting an updated package therefore
//! requires a clean output directory.
use fs_err as fs;
use std::path::{Path, PathBuf};

use crate::classify::{Category, PathRecord};
use crate::permissions::{EXECUTABLE, set_mode};

/// Errors raised while copying files
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error("failed to copy {} to {}: {error}", .from.display(), .to.display())]
    CopyFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("copied {copied} files but {placed} were accounted for by category")]
    AccountingMismatch { copied: usize, placed: usize },
}

/// The files written by [`materialize`], grouped by category.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Copied dispatchers
    pub dispatchers: Vec<PathBuf>,
    /// Copied shared libraries
    pub libraries: Vec<PathBuf>,
    /// Copied data files
    pub data_files: Vec<PathBuf>,
    /// Copied importable modules
    pub modules: Vec<PathBuf>,
    /// Number of files copied
    pub copied: usize,
    /// Number of records that were ignored
    pub ignored: usize,
}

impl Materialized {
    /// Number of copied files, summed over the categories
    pub fn placed(&self) -> usize {
        self.dispatchers.len() + self.libraries.len() + self.data_files.len() + self.modules.len()
    }

    /// Number of processed records, copied or ignored
    pub fn processed(&self) -> usize {
        self.copied + self.ignored
    }

    fn push(&mut self, category: Category, destination: PathBuf) {
        match category {
            Category::Dispatcher => self.dispatchers.push(destination),
            Category::SharedLibrary => self.libraries.push(destination),
            Category::DataFile => self.data_files.push(destination),
            Category::ImportableModule => self.modules.push(destination),
            Category::Ignore => return,
        }
        self.copied += 1;
    }
}

/// Copy every non-ignored record to its destination, in record order.
pub fn materialize(records: &[PathRecord]) -> Result<Materialized, MaterializeError> {
    let mut result = Materialized::default();

    for record in records {
        let destination = match (record.category, &record.destination) {
            (Category::Ignore, _) | (_, None) => {
                tracing::trace!("Ignoring {}", record.source.display());
                result.ignored += 1;
                continue;
            }
            (_, Some(destination)) => destination,
        };

        copy_file(&record.source, destination, record.category)?;
        tracing::debug!(
            "Copied {} {}\n    -> {}",
            record.category,
            record.source.display(),
            destination.display()
        );
        result.push(record.category, destination.clone());
    }

    if result.copied != result.placed() {
        return Err(MaterializeError::AccountingMismatch {
            copied: result.copied,
            placed: result.placed(),
        });
    }

    Ok(result)
}

fn copy_file(from: &Path, to: &Path, category: Category) -> Result<(), MaterializeError> {
    let copy_failure = |error| MaterializeError::CopyFailure {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        error,
    };

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(copy_failure)?;
    }
    // `copy` carries the permission bits over as well
    fs::copy(from, to).map_err(copy_failure)?;

    if category == Category::Dispatcher {
        set_mode(to, EXECUTABLE).map_err(copy_failure)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifier;
    use crate::layout::OutputLayout;
    use crate::manifest::test_utils::write_package;
    use crate::platform::PlatformStrategy;
    use rattler_conda_types::Platform;

    fn records(package: &Path, output: &Path, paths: &[&str]) -> Vec<PathRecord> {
        let classifier = Classifier::new(
            PlatformStrategy::for_platform(Platform::Linux64),
            OutputLayout::new(output, "libtbx"),
            ["libtbx.pythonw".to_string()],
        );
        paths
            .iter()
            .map(|p| classifier.record(package, p))
            .collect()
    }

    #[test]
    fn every_placed_record_has_exactly_one_file() {
        let package = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let paths = [
            "bin/cctbx.python",
            "bin/libtbx.pythonw",
            "lib/libcctbx.so",
            "lib/python3.11/site-packages/cctbx/__init__.py",
            "lib/python3.11/site-packages/cctbx/__pycache__/__init__.cpython-311.pyc",
            "share/cctbx/sym.lib",
            "include/cctbx/error.h",
        ];
        write_package(package.path(), &paths);

        let records = records(package.path(), output.path(), &paths);
        let result = materialize(&records).unwrap();

        assert_eq!(result.copied, 4);
        assert_eq!(result.ignored, 3);
        assert_eq!(result.processed(), paths.len());
        assert_eq!(result.placed(), result.copied);

        for record in &records {
            match &record.destination {
                Some(destination) => {
                    let content = fs::read_to_string(destination).unwrap();
                    let relative = record.relative_path.to_string_lossy().replace('\\', "/");
                    assert_eq!(content, format!("content of {relative}"));
                }
                None => assert_eq!(record.category, Category::Ignore),
            }
        }

        let written = walkdir::WalkDir::new(output.path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .count();
        assert_eq!(written, result.copied);
    }

    #[cfg(unix)]
    #[test]
    fn dispatchers_are_made_executable() {
        use std::os::unix::fs::PermissionsExt;

        let package = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let paths = ["bin/tool", "share/data/x.dat"];
        write_package(package.path(), &paths);
        set_mode(&package.path().join("bin/tool"), 0o644).unwrap();
        set_mode(&package.path().join("share/data/x.dat"), 0o640).unwrap();

        let records = records(package.path(), output.path(), &paths);
        let result = materialize(&records).unwrap();

        let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&result.dispatchers[0]), 0o755);
        // other files keep their mode
        assert_eq!(mode(&result.data_files[0]), 0o640);
    }

    #[test]
    fn missing_source_is_fatal() {
        let package = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_package(package.path(), &["bin/tool"]);

        let records = records(package.path(), output.path(), &["bin/tool", "share/gone.dat"]);
        let err = materialize(&records).unwrap_err();
        match err {
            MaterializeError::CopyFailure { from, .. } => {
                assert_eq!(from, package.path().join("share/gone.dat"))
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn existing_files_are_overwritten() {
        let package = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_package(package.path(), &["share/x.dat"]);
        let records = records(package.path(), output.path(), &["share/x.dat"]);

        let destination = records[0].destination.clone().unwrap();
        fs::create_dir_all(destination.parent().unwrap()).unwrap();
        fs::write(&destination, "stale").unwrap();

        materialize(&records).unwrap();
        assert_eq!(
            fs::read_to_string(&destination).unwrap(),
            "content of share/x.dat"
        );
    }
}
