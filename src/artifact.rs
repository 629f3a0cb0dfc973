//! Download build artifacts from Azure DevOps pipelines.
//!
//! The REST calls are:
//!
//! * `GET {org}/{project}/_apis/build/builds?definitions=..` to find the
//!   latest successful run of a build definition
//! * `GET {org}/{project}/_apis/build/builds/{run}/artifacts` to list the
//!   artifacts of a run
//!
//! after which the `downloadUrl` of the requested artifact is streamed to disk.
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressState, style::TemplateError};
use serde::Deserialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use url::Url;

use conda_to_wheel_networking::{Credentials, Download, HttpClient, NetworkError, Response};

/// The public Azure DevOps service
pub const AZURE_DEVOPS_URL: &str = "https://dev.azure.com/";

/// The REST API version used unless another one is requested
pub const DEFAULT_API_VERSION: &str = "7.1";

/// Where the artifact is written unless another file is requested
pub const DEFAULT_LOCAL_FILENAME: &str = "artifact.zip";

/// Personal access tokens are sent as the password of this user
pub const ACCESS_TOKEN_USER: &str = "user";

/// Errors raised while resolving or downloading an artifact
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("either a run id or a build definition id is required")]
    MissingRunSelector,

    #[error("request to {url} failed with status {status}: {body}")]
    HttpRequestFailure { url: Url, status: u16, body: String },

    #[error("build definition {definition} has no successful completed run")]
    NoSuccessfulRun { definition: u64 },

    #[error("run {run_id} has no artifact named {name:?} (available: {})", .available.join(", "))]
    MissingArtifact {
        name: String,
        run_id: u64,
        available: Vec<String>,
    },

    #[error("{0} cannot be used as a base URL")]
    InvalidBaseUrl(Url),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("invalid progress bar template: {0}")]
    ProgressTemplate(#[from] TemplateError),
}

/// Which pipeline run to take the artifact from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSelector {
    /// A specific run (build id)
    Run(u64),
    /// The latest successful, completed run of a build definition
    LatestSuccessful { definition: u64 },
}

impl RunSelector {
    /// An explicit run id takes precedence over a definition id.
    pub fn from_options(run_id: Option<u64>, definition: Option<u64>) -> Result<Self, ArtifactError> {
        match (run_id, definition) {
            (Some(run_id), _) => Ok(Self::Run(run_id)),
            (None, Some(definition)) => Ok(Self::LatestSuccessful { definition }),
            (None, None) => Err(ArtifactError::MissingRunSelector),
        }
    }
}

/// Everything needed to locate one artifact.
#[derive(Debug, Clone)]
pub struct ArtifactQuery {
    pub base_url: Url,
    pub organization: String,
    pub project: String,
    pub selector: RunSelector,
    pub api_version: String,
    pub artifact_name: String,
}

impl ArtifactQuery {
    fn endpoint(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Url, ArtifactError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ArtifactError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push(&self.organization)
            .push(&self.project)
            .push("_apis")
            .extend(segments);
        url.query_pairs_mut()
            .extend_pairs(query)
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Lists the successful, completed runs of a build definition.
    pub fn builds_url(&self, definition: u64) -> Result<Url, ArtifactError> {
        self.endpoint(
            &["build", "builds"],
            &[
                ("definitions", definition.to_string().as_str()),
                ("resultFilter", "succeeded"),
                ("statusFilter", "completed"),
            ],
        )
    }

    /// Lists the artifacts of a run.
    pub fn artifacts_url(&self, run_id: u64) -> Result<Url, ArtifactError> {
        self.endpoint(
            &["build", "builds", run_id.to_string().as_str(), "artifacts"],
            &[],
        )
    }
}

#[derive(Debug, Deserialize)]
struct ValueList<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Build {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Artifact {
    name: String,
    resource: ArtifactResource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtifactResource {
    download_url: Url,
}

/// Returns the style to use for the download progress bar.
fn default_bytes_style() -> Result<indicatif::ProgressStyle, TemplateError> {
    Ok(indicatif::ProgressStyle::default_spinner()
        .template("{spinner:.green} {prefix:20!} [{elapsed_precise}] {bytes:>10} @ {smoothed_bytes_per_sec:8}")?
        .with_key(
            "smoothed_bytes_per_sec",
            |s: &ProgressState, w: &mut dyn Write| match (s.pos(), s.elapsed().as_millis()) {
                (pos, elapsed_ms) if elapsed_ms > 0 => {
                    _ = write!(w, "{}/s", HumanBytes((pos as f64 * 1000_f64 / elapsed_ms as f64) as u64));
                }
                _ => {
                    _ = write!(w, "-");
                }
            },
        ))
}

/// Resolves and downloads artifacts through an [`HttpClient`].
pub struct ArtifactDownloader<C> {
    client: C,
    credentials: Option<Credentials>,
    multi_progress: MultiProgress,
}

impl<C: HttpClient> ArtifactDownloader<C> {
    /// With an access token all requests are authenticated.
    pub fn new(client: C, access_token: Option<String>, multi_progress: MultiProgress) -> Self {
        Self {
            client,
            credentials: access_token.map(|token| Credentials::basic(ACCESS_TOKEN_USER, token)),
            multi_progress,
        }
    }

    async fn get(&self, url: &Url) -> Result<Response, ArtifactError> {
        tracing::info!("Requesting {}", url);
        let response = self.client.get(url, self.credentials.as_ref()).await?;
        tracing::debug!("Status {}", response.status);
        check_status(url, response)
    }

    /// The id of the latest successful run of a build definition.
    pub async fn latest_run_id(&self, query: &ArtifactQuery, definition: u64) -> Result<u64, ArtifactError> {
        let url = query.builds_url(definition)?;
        let builds: ValueList<Build> = self.get(&url).await?.json()?;
        builds
            .value
            .first()
            .map(|build| build.id)
            .ok_or(ArtifactError::NoSuccessfulRun { definition })
    }

    /// Resolve the run of the query to an id.
    pub async fn resolve_run(&self, query: &ArtifactQuery) -> Result<u64, ArtifactError> {
        match query.selector {
            RunSelector::Run(run_id) => Ok(run_id),
            RunSelector::LatestSuccessful { definition } => {
                let run_id = self.latest_run_id(query, definition).await?;
                tracing::info!("Latest successful run of definition {} is {}", definition, run_id);
                Ok(run_id)
            }
        }
    }

    /// The download URL of the requested artifact of a run.
    pub async fn find_download_url(&self, query: &ArtifactQuery, run_id: u64) -> Result<Url, ArtifactError> {
        let url = query.artifacts_url(run_id)?;
        let artifacts: ValueList<Artifact> = self.get(&url).await?.json()?;

        let available = artifacts.value.iter().map(|a| a.name.clone()).collect::<Vec<_>>();
        artifacts
            .value
            .into_iter()
            .find(|artifact| artifact.name == query.artifact_name)
            .map(|artifact| artifact.resource.download_url)
            .ok_or_else(|| ArtifactError::MissingArtifact {
                name: query.artifact_name.clone(),
                run_id,
                available,
            })
    }

    /// Stream `url` into `destination` with a progress bar.
    pub async fn download_to(&self, url: &Url, destination: &Path) -> Result<u64, ArtifactError> {
        tracing::info!("Downloading {} to {}", url, destination.display());

        let progress_bar = self.multi_progress.add(
            ProgressBar::new_spinner()
                .with_style(default_bytes_style()?)
                .with_prefix(
                    destination
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                ),
        );
        let on_chunk = |len: u64| progress_bar.inc(len);

        let download = self
            .client
            .download(url, self.credentials.as_ref(), destination, &on_chunk)
            .await;
        match download {
            Ok(Download::Completed { bytes }) => {
                progress_bar.finish_with_message("Done");
                tracing::info!("Downloaded {}", HumanBytes(bytes));
                Ok(bytes)
            }
            Ok(Download::Rejected(response)) => {
                progress_bar.abandon_with_message("Failed");
                check_status(url, response).map(|_| 0)
            }
            Err(err) => {
                progress_bar.abandon_with_message("Failed");
                Err(err.into())
            }
        }
    }

    /// Resolve the run, find the artifact and download it to `destination`.
    pub async fn download(&self, query: &ArtifactQuery, destination: &Path) -> Result<PathBuf, ArtifactError> {
        let run_id = self.resolve_run(query).await?;
        let download_url = self.find_download_url(query, run_id).await?;
        self.download_to(&download_url, destination).await?;
        Ok(destination.to_path_buf())
    }
}

fn check_status(url: &Url, response: Response) -> Result<Response, ArtifactError> {
    if response.is_success() {
        return Ok(response);
    }
    Err(ArtifactError::HttpRequestFailure {
        url: url.clone(),
        status: response.status,
        body: response.text(),
    })
}
