//! Configuration for a conversion run.
//!
//! Settings come from the command line, optionally backed by a TOML file:
//!
//! ```toml
//! package-name = "libtbx"
//! ignored-names = ["libtbx.pythonw"]
//! pyproject = "pyproject.toml"
//! output-dir = "."
//! ```
//!
//! Relative paths in the file are resolved against the directory of the file.
//! Command line flags take precedence.
use fs_err as fs;
use rattler_conda_types::Platform;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::consts::{DEFAULT_IGNORED_NAMES, DEFAULT_METADATA_FILE, DEFAULT_PACKAGE_NAME};
use crate::opt::ConvertOpts;

/// The user agent used for all HTTP requests
pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Errors raised while loading the configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0:?} is not a valid python package name")]
    InvalidPackageName(String),
}

/// The optional configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFile {
    pub package_name: Option<String>,
    pub ignored_names: Option<Vec<String>>,
    pub pyproject: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Load a configuration file. Relative paths are made relative to its directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let mut config: ConfigFile = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or(Path::new("."));
        for dir in [&mut config.pyproject, &mut config.output_dir].into_iter().flatten() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        Ok(config)
    }
}

/// The resolved settings of one conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Root of the extracted conda package
    pub package_path: PathBuf,
    /// Root of the wheel source tree, absolute
    pub output_dir: PathBuf,
    /// Metadata file receiving the console scripts
    pub pyproject: PathBuf,
    /// Package owning the core and dispatcher directories
    pub package_name: String,
    /// File names that are never copied
    pub ignored_names: Vec<String>,
    /// Platform the package was built for
    pub target_platform: Platform,
    /// Environment providing the shared libraries at runtime
    pub runtime_prefix: Option<PathBuf>,
}

impl ConverterConfig {
    /// Defaults for converting `package_path` into the current directory.
    pub fn new(package_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            package_path: package_path.into(),
            pyproject: output_dir.join(DEFAULT_METADATA_FILE),
            output_dir,
            package_name: DEFAULT_PACKAGE_NAME.to_string(),
            ignored_names: DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect(),
            target_platform: Platform::current(),
            runtime_prefix: None,
        }
    }

    /// Merge the command line with the optional configuration file.
    pub fn from_opts(opts: ConvertOpts) -> Result<Self, ConfigError> {
        let file = match &opts.config {
            Some(path) => ConfigFile::from_path(path)?,
            None => ConfigFile::default(),
        };
        Self::merge(opts, file)
    }

    fn merge(opts: ConvertOpts, file: ConfigFile) -> Result<Self, ConfigError> {
        let output_dir = opts
            .output_dir
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let output_dir = std::path::absolute(output_dir)?;

        let pyproject = opts
            .pyproject
            .or(file.pyproject)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_METADATA_FILE));

        let package_name = opts
            .package_name
            .or(file.package_name)
            .unwrap_or_else(|| DEFAULT_PACKAGE_NAME.to_string());
        if !is_python_identifier(&package_name) {
            return Err(ConfigError::InvalidPackageName(package_name));
        }

        let ignored_names = if !opts.ignore.is_empty() {
            opts.ignore
        } else {
            file.ignored_names.unwrap_or_else(|| {
                DEFAULT_IGNORED_NAMES.iter().map(|s| s.to_string()).collect()
            })
        };

        Ok(Self {
            package_path: opts.conda_package_path,
            output_dir,
            pyproject,
            package_name,
            ignored_names,
            target_platform: opts.target_platform.unwrap_or_else(Platform::current),
            runtime_prefix: opts.runtime_prefix,
        })
    }
}

fn is_python_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    fn opts(args: &[&str]) -> ConvertOpts {
        let mut argv = vec!["convert", "--conda-package-path", "/pkgs/cctbx-base"];
        argv.extend_from_slice(args);
        ConvertOpts::parse_from(argv)
    }

    #[test]
    fn defaults() {
        let config = ConverterConfig::merge(opts(&[]), ConfigFile::default()).unwrap();
        assert_eq!(config.package_name, "libtbx");
        assert_eq!(config.ignored_names, ["libtbx.pythonw"]);
        assert_eq!(config.pyproject, PathBuf::from("pyproject.toml"));
        assert!(config.output_dir.is_absolute());
        assert_eq!(config.package_path, PathBuf::from("/pkgs/cctbx-base"));
    }

    #[test]
    fn command_line_wins_over_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("convert.toml");
        fs::write(
            &config_path,
            r#"
package-name = "dials"
ignored-names = ["dials.pythonw", "dials.help"]
pyproject = "meta/pyproject.toml"
output-dir = "build"
"#,
        )
        .unwrap();

        let file = ConfigFile::from_path(&config_path).unwrap();
        assert_eq!(file.pyproject, Some(tmp.path().join("meta/pyproject.toml")));
        assert_eq!(file.output_dir, Some(tmp.path().join("build")));

        let config = ConverterConfig::merge(
            opts(&["--package-name", "xfel", "--target-platform", "osx-arm64"]),
            file,
        )
        .unwrap();
        assert_eq!(config.package_name, "xfel");
        assert_eq!(config.ignored_names, ["dials.pythonw", "dials.help"]);
        assert_eq!(config.output_dir, tmp.path().join("build"));
        assert_eq!(config.target_platform, Platform::OsxArm64);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("convert.toml");
        fs::write(&config_path, "packagename = \"x\"\n").unwrap();

        let err = ConfigFile::from_path(&config_path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[rstest]
    #[case("libtbx", true)]
    #[case("_private", true)]
    #[case("cctbx2", true)]
    #[case("2cctbx", false)]
    #[case("lib-tbx", false)]
    #[case("", false)]
    fn package_names(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(is_python_identifier(name), valid);
    }
}
