/// Plain list of every file in an extracted conda package.
pub const INFO_FILES: &str = "info/files";

/// JSON list of every path record in an extracted conda package.
pub const INFO_PATHS_JSON: &str = "info/paths.json";

/// Placeholder token replaced by `update-version`.
pub const VERSION_PLACEHOLDER: &str = "REPLACEME";

/// The line in the metadata file where generated scripts are inserted.
pub const SCRIPTS_MARKER: &str = "INSERT_SCRIPTS_HERE";

/// First line of the generated scripts block.
pub const SCRIPTS_BEGIN: &str = "# BEGIN GENERATED SCRIPTS";

/// Last line of the generated scripts block.
pub const SCRIPTS_END: &str = "# END GENERATED SCRIPTS";

/// Default metadata file patched with entry points and versions.
pub const DEFAULT_METADATA_FILE: &str = "pyproject.toml";

/// Top level importable package that receives the core data and dispatchers.
pub const DEFAULT_PACKAGE_NAME: &str = "libtbx";

/// Package initializer, never wrapped as a dispatcher.
pub const PACKAGE_INITIALIZER: &str = "__init__.py";

/// Function every generated launcher exposes.
pub const LAUNCHER_FUNCTION: &str = "run_command";

/// Files that are never copied, matched by file name.
pub const DEFAULT_IGNORED_NAMES: &[&str] = &["libtbx.pythonw"];
