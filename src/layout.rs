//! The directory layout of the generated wheel source tree.
use fs_err as fs;
use std::path::{Path, PathBuf};

use crate::consts::PACKAGE_INITIALIZER;

/// Destination directories of a conversion run.
///
/// ```text
/// <output>/
/// ├── lib/                         shared libraries
/// └── src/                         importable modules
///     └── <package>/core/          data files
///         └── dispatchers/         dispatchers and their launchers
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    package_name: String,
    module_root: PathBuf,
    library_dir: PathBuf,
    core_dir: PathBuf,
    dispatcher_dir: PathBuf,
}

impl OutputLayout {
    /// Compute the layout below `output_dir`, which should be absolute.
    pub fn new(output_dir: &Path, package_name: &str) -> Self {
        let module_root = output_dir.join("src");
        let core_dir = module_root.join(package_name).join("core");
        Self {
            package_name: package_name.to_string(),
            library_dir: output_dir.join("lib"),
            dispatcher_dir: core_dir.join("dispatchers"),
            core_dir,
            module_root,
        }
    }

    /// The top level importable package that owns the core directory
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Root of the importable modules (`site-packages` equivalent)
    pub fn module_root(&self) -> &Path {
        &self.module_root
    }

    /// Flat directory for shared libraries
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Directory for shared data files
    pub fn core_dir(&self) -> &Path {
        &self.core_dir
    }

    /// Flat directory for dispatchers and generated launchers
    pub fn dispatcher_dir(&self) -> &Path {
        &self.dispatcher_dir
    }

    /// The dotted module path of the dispatcher directory, e.g. `libtbx.core.dispatchers`
    pub fn dispatcher_module(&self) -> String {
        format!("{}.core.dispatchers", self.package_name)
    }

    /// Create all directories and make the core and dispatcher directories importable.
    pub fn prepare(&self) -> std::io::Result<()> {
        for dir in [
            &self.module_root,
            &self.library_dir,
            &self.core_dir,
            &self.dispatcher_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        for dir in [&self.core_dir, &self.dispatcher_dir] {
            let init = dir.join(PACKAGE_INITIALIZER);
            if !init.exists() {
                fs::write(&init, "")?;
            }
        }
        Ok(())
    }
}
