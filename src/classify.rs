//! Classification of package paths into wheel layout destinations.
//!
//! Every path recorded in the package manifest is mapped to exactly one
//! [`Category`]. The rules are evaluated in priority order and the first
//! match wins:
//!
//! 1. caches, `egg-info` / `dist-info` metadata and ignored names are dropped
//! 2. files below `bin/` become dispatchers
//! 3. files below `site-packages/` become importable modules
//! 4. files below `share/` become core data files
//! 5. files with a native library suffix become shared libraries
//! 6. on Windows, the `Library/` and `Lib/` prefixes are classified again
//! 7. everything else is ignored
//!
//! Classification is a pure function of the relative path, the platform
//! strategy, the output layout and the ignore list.
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::layout::OutputLayout;
use crate::platform::PlatformStrategy;
use crate::utils::{after_last_segment, parent_segments, strip_script_suffix};

const BIN_DIRS: &[&str] = &["bin", "sbin"];

/// Where a file ends up in the wheel layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Not copied
    Ignore,
    /// An executable or script exposed as a command
    Dispatcher,
    /// A native library or extension module
    SharedLibrary,
    /// Shared data below the core directory
    DataFile,
    /// A python module below the module root
    ImportableModule,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::Ignore => "ignored",
            Category::Dispatcher => "dispatcher",
            Category::SharedLibrary => "shared library",
            Category::DataFile => "data file",
            Category::ImportableModule => "module",
        };
        f.write_str(name)
    }
}

/// A manifest entry together with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    /// Path relative to the package root
    pub relative_path: PathBuf,
    /// Absolute path of the file inside the extracted package
    pub source: PathBuf,
    /// Destination category
    pub category: Category,
    /// Absolute destination, `None` iff the category is [`Category::Ignore`]
    pub destination: Option<PathBuf>,
}

/// Maps relative package paths to destinations.
#[derive(Debug, Clone)]
pub struct Classifier {
    strategy: PlatformStrategy,
    layout: OutputLayout,
    ignored_names: BTreeSet<String>,
}

impl Classifier {
    /// Create a classifier for the given platform and output layout.
    pub fn new(
        strategy: PlatformStrategy,
        layout: OutputLayout,
        ignored_names: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            strategy,
            layout,
            ignored_names: ignored_names.into_iter().collect(),
        }
    }

    /// Classify a manifest entry of the package extracted at `package_root`.
    pub fn record(&self, package_root: &Path, relative_path: &str) -> PathRecord {
        let relative_path = PathBuf::from(relative_path.trim());
        let (category, destination) = match self.classify(&relative_path) {
            Some((category, destination)) => (category, Some(destination)),
            None => (Category::Ignore, None),
        };
        PathRecord {
            source: package_root.join(&relative_path),
            relative_path,
            category,
            destination,
        }
    }

    /// Classify a single relative path. `None` means the path is ignored.
    pub fn classify(&self, relative_path: &Path) -> Option<(Category, PathBuf)> {
        // absolute paths and `..` would escape the output tree
        if !relative_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        let file_name = relative_path.file_name()?.to_string_lossy().into_owned();
        let parents = parent_segments(relative_path);
        let top_level = parents.first().map(String::as_str);

        if is_metadata_or_cache(relative_path) || self.is_ignored_name(&file_name) {
            return None;
        }

        if top_level.is_some_and(|top| BIN_DIRS.contains(&top)) {
            return Some((
                Category::Dispatcher,
                self.layout.dispatcher_dir().join(&file_name),
            ));
        }

        if let Some(module_path) = after_last_segment(relative_path, "site-packages") {
            return Some((
                Category::ImportableModule,
                self.layout.module_root().join(module_path),
            ));
        }

        if top_level == Some("share") {
            return Some((Category::DataFile, self.layout.core_dir().join(relative_path)));
        }

        if self.has_library_suffix(relative_path) {
            return Some((
                Category::SharedLibrary,
                self.layout.library_dir().join(&file_name),
            ));
        }

        if self.strategy.windows_layout() {
            return self.classify_windows(relative_path, &file_name);
        }

        None
    }

    /// The `Library/` (native) and `Lib/` (python stdlib layout) prefixes of
    /// Windows packages.
    fn classify_windows(
        &self,
        relative_path: &Path,
        file_name: &str,
    ) -> Option<(Category, PathBuf)> {
        if let Some(library_path) = after_last_segment(relative_path, "Library") {
            let parents = parent_segments(&library_path);
            return match parents.first().map(String::as_str) {
                Some("bin") if !file_name.ends_with(".exe") => Some((
                    Category::Dispatcher,
                    self.layout.dispatcher_dir().join(file_name),
                )),
                Some("share" | "include") => {
                    Some((Category::DataFile, self.layout.core_dir().join(library_path)))
                }
                Some("lib") => Some((
                    Category::SharedLibrary,
                    self.layout.library_dir().join(file_name),
                )),
                _ => None,
            };
        }

        // caches and `Lib/site-packages` were already handled by the generic rules
        if let Some(lib_path) = after_last_segment(relative_path, "Lib") {
            return Some((
                Category::SharedLibrary,
                self.layout.library_dir().join(lib_path),
            ));
        }

        None
    }

    fn is_ignored_name(&self, file_name: &str) -> bool {
        self.ignored_names.contains(file_name)
            || self.ignored_names.contains(strip_script_suffix(file_name))
    }

    fn has_library_suffix(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.strategy.is_library_suffix(&ext.to_string_lossy()))
            .unwrap_or(false)
    }
}

/// Bytecode caches and the metadata of other installers are never copied.
fn is_metadata_or_cache(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    if parent_segments(path).iter().any(|s| s == "__pycache__") {
        return true;
    }
    let parent = parent.to_string_lossy();
    parent.contains("egg-info") || parent.contains("dist-info")
}
