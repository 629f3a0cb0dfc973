//! Command-line options.

use std::path::PathBuf;

use clap::{Parser, crate_version};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use rattler_conda_types::Platform;
use url::Url;

use crate::artifact::{AZURE_DEVOPS_URL, DEFAULT_API_VERSION, DEFAULT_LOCAL_FILENAME};
use crate::consts::DEFAULT_METADATA_FILE;
use crate::console_utils::LogStyle;

/// Application subcommands.
#[derive(Parser)]
pub enum SubCommands {
    /// Repackage an extracted conda package as a wheel source tree
    ///
    /// Every file listed in the package manifest is classified and copied
    /// into the output directory. Dispatchers get a python launcher each,
    /// registered as console scripts in the metadata file. On macOS the
    /// `@rpath` references of all binaries are pointed at the runtime prefix.
    Convert(ConvertOpts),

    /// Download a build artifact from Azure DevOps
    DownloadArtifact(DownloadArtifactOpts),

    /// Replace the version placeholder in a metadata file
    UpdateVersion(UpdateVersionOpts),
}

#[derive(Parser)]
#[clap(version = crate_version!())]
pub struct App {
    /// Subcommand.
    #[clap(subcommand)]
    pub subcommand: SubCommands,

    /// Enable verbose logging.
    #[command(flatten)]
    pub verbose: Verbosity<InfoLevel>,

    /// Logging style
    #[clap(
        long,
        env = "CONDA_TO_WHEEL_LOG_STYLE",
        default_value = "fancy",
        global = true
    )]
    pub log_style: LogStyle,
}

/// Options for the `convert` command.
#[derive(Parser, Debug, Clone)]
pub struct ConvertOpts {
    /// Root of the extracted conda package, containing `info/files`
    #[arg(long)]
    pub conda_package_path: PathBuf,

    /// Root of the generated wheel source tree. Defaults to the current directory.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Metadata file that receives the console scripts [default: pyproject.toml]
    #[arg(long)]
    pub pyproject: Option<PathBuf>,

    /// The platform the package was built for. Defaults to the current platform.
    #[arg(long)]
    pub target_platform: Option<Platform>,

    /// Environment that provides the shared libraries at runtime (macOS only).
    #[arg(long, env = "CONDA_PREFIX")]
    pub runtime_prefix: Option<PathBuf>,

    /// TOML file with the package name, ignored names, metadata file and output directory
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Python package that receives the core data and the dispatchers [default: libtbx]
    #[arg(long)]
    pub package_name: Option<String>,

    /// File names that are never copied. Can be given multiple times.
    #[arg(long = "ignore", value_name = "NAME")]
    pub ignore: Vec<String>,
}

/// Options for the `download-artifact` command.
#[derive(Parser, Debug, Clone)]
pub struct DownloadArtifactOpts {
    /// Azure DevOps organization
    #[arg(long)]
    pub organization: String,

    /// Azure DevOps project
    #[arg(long)]
    pub project: String,

    /// The pipeline run to download from
    #[arg(long)]
    pub run_id: Option<u64>,

    /// Build definition whose latest successful run is used when no run id is given
    #[arg(long)]
    pub definitions: Option<u64>,

    /// REST API version
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Name of the artifact to download
    #[arg(long)]
    pub artifact_name: String,

    /// File the artifact is written to
    #[arg(long, default_value = DEFAULT_LOCAL_FILENAME)]
    pub local_filename: PathBuf,

    /// Personal access token
    #[arg(long, env = "AZURE_DEVOPS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Base URL of the Azure DevOps REST API
    #[arg(long, default_value = AZURE_DEVOPS_URL, hide = true)]
    pub base_url: Url,
}

/// Options for the `update-version` command.
#[derive(Parser, Debug, Clone)]
pub struct UpdateVersionOpts {
    /// The version that replaces the placeholder
    #[arg(long)]
    pub version: String,

    /// The file to update
    #[arg(long, default_value = DEFAULT_METADATA_FILE)]
    pub filename: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_convert() {
        let app = App::parse_from([
            "conda-to-wheel",
            "-v",
            "convert",
            "--conda-package-path",
            "pkg",
            "--target-platform",
            "win-64",
            "--ignore",
            "a",
            "--ignore",
            "b",
        ]);
        let SubCommands::Convert(opts) = app.subcommand else {
            panic!("expected convert");
        };
        assert_eq!(opts.conda_package_path, PathBuf::from("pkg"));
        assert_eq!(opts.target_platform, Some(Platform::Win64));
        assert_eq!(opts.ignore, ["a", "b"]);
    }

    #[test]
    fn download_defaults() {
        let app = App::parse_from([
            "conda-to-wheel",
            "download-artifact",
            "--organization",
            "org",
            "--project",
            "proj",
            "--definitions",
            "7",
            "--artifact-name",
            "wheels",
        ]);
        let SubCommands::DownloadArtifact(opts) = app.subcommand else {
            panic!("expected download-artifact");
        };
        assert_eq!(opts.api_version, "7.1");
        assert_eq!(opts.local_filename, PathBuf::from("artifact.zip"));
        assert_eq!(opts.run_id, None);
        assert_eq!(opts.definitions, Some(7));
        assert_eq!(opts.base_url.as_str(), "https://dev.azure.com/");
    }

    #[test]
    fn update_version_defaults_to_pyproject() {
        let app = App::parse_from(["conda-to-wheel", "update-version", "--version", "1.2"]);
        let SubCommands::UpdateVersion(opts) = app.subcommand else {
            panic!("expected update-version");
        };
        assert_eq!(opts.filename, PathBuf::from("pyproject.toml"));
        assert_eq!(opts.version, "1.2");
    }
}
