//! This is the main entry point for the `conda-to-wheel` binary.

use clap::Parser;
use indicatif::MultiProgress;
use miette::IntoDiagnostic;

use conda_to_wheel::{
    artifact::{ArtifactDownloader, ArtifactQuery, RunSelector},
    console_utils::init_logging,
    convert::convert,
    opt::{App, ConvertOpts, DownloadArtifactOpts, SubCommands, UpdateVersionOpts},
    tool_configuration::{APP_USER_AGENT, ConverterConfig},
    version::update_version,
};
use conda_to_wheel_networking::BaseClient;

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let app = App::parse();

    let multi_progress = MultiProgress::new();
    init_logging(
        app.log_style,
        app.verbose.tracing_level_filter(),
        &multi_progress,
    )
    .into_diagnostic()?;

    match app.subcommand {
        SubCommands::Convert(opts) => run_convert(opts),
        SubCommands::DownloadArtifact(opts) => run_download(opts, multi_progress).await,
        SubCommands::UpdateVersion(opts) => run_update_version(opts),
    }
}

fn run_convert(opts: ConvertOpts) -> miette::Result<()> {
    let config = ConverterConfig::from_opts(opts).into_diagnostic()?;
    let result = convert(&config).into_diagnostic()?;
    if !result.is_satisfied() {
        return Err(miette::miette!(
            "not every manifest entry was processed: {}",
            result
        ));
    }
    tracing::info!("Done: {}", result);
    Ok(())
}

async fn run_download(opts: DownloadArtifactOpts, multi_progress: MultiProgress) -> miette::Result<()> {
    let selector = RunSelector::from_options(opts.run_id, opts.definitions).into_diagnostic()?;
    let query = ArtifactQuery {
        base_url: opts.base_url,
        organization: opts.organization,
        project: opts.project,
        selector,
        api_version: opts.api_version,
        artifact_name: opts.artifact_name,
    };

    let client = BaseClient::builder()
        .user_agent(APP_USER_AGENT)
        .build()
        .into_diagnostic()?;
    let downloader = ArtifactDownloader::new(client, opts.access_token, multi_progress);
    let path = downloader
        .download(&query, &opts.local_filename)
        .await
        .into_diagnostic()?;
    tracing::info!("Downloaded {} to {}", query.artifact_name, path.display());
    Ok(())
}

fn run_update_version(opts: UpdateVersionOpts) -> miette::Result<()> {
    update_version(&opts.filename, &opts.version).into_diagnostic()?;
    Ok(())
}
