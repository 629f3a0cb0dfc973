//! Networking utilities for conda-to-wheel
//!
//! This crate provides the HTTP seam used by the artifact downloader. The
//! [`HttpClient`] trait is the only thing the rest of the workspace depends
//! on, so tests can swap the real [`BaseClient`] for an in-memory fake.

use std::{fmt, path::Path};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use url::Url;

/// Default user agent if none is provided
const DEFAULT_USER_AGENT: &str = concat!("conda-to-wheel", "/", env!("CARGO_PKG_VERSION"));

/// Errors raised while talking to a remote server
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// The request could not be sent or the body could not be read
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Writing the downloaded body to disk failed
    #[error("failed to write download: {0}")]
    Io(#[from] std::io::Error),

    /// The response body was not the expected JSON document
    #[error("failed to parse response body as JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// HTTP basic credentials. The password is never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Basic credentials for the given user.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// The user name sent with the request
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The secret sent with the request
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code
    pub status: u16,
    /// The raw body
    pub body: Vec<u8>,
}

impl Response {
    /// Returns true for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body decoded as (lossy) UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Outcome of streaming a URL into a file.
#[derive(Debug)]
pub enum Download {
    /// The server answered with a 2xx status and the body was written.
    Completed {
        /// Number of bytes written to the destination
        bytes: u64,
    },
    /// The server answered with a non-2xx status. Nothing was written.
    Rejected(Response),
}

/// The HTTP operations the downloader needs.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request and buffer the whole response.
    async fn get(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<Response, NetworkError>;

    /// Stream the body of a GET request into `destination`.
    ///
    /// The destination file is only created once the server has answered with
    /// a success status. `on_chunk` is called with the size of every chunk
    /// that was written.
    async fn download(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
        destination: &Path,
        on_chunk: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<Download, NetworkError>;
}

/// The reqwest backed client
#[derive(Clone, Debug)]
pub struct BaseClient {
    client: reqwest::Client,
}

impl BaseClient {
    /// Create a new BaseClient with default settings
    pub fn new() -> Result<Self, NetworkError> {
        Self::builder().build()
    }

    /// Create a builder for configuring the BaseClient
    pub fn builder() -> BaseClientBuilder {
        BaseClientBuilder::default()
    }

    fn request(&self, url: &Url, credentials: Option<&Credentials>) -> reqwest::RequestBuilder {
        let request = self.client.get(url.clone());
        match credentials {
            Some(credentials) => {
                request.basic_auth(credentials.username(), Some(credentials.password()))
            }
            None => request,
        }
    }
}

#[async_trait]
impl HttpClient for BaseClient {
    async fn get(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<Response, NetworkError> {
        let response = self.request(url, credentials).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        tracing::debug!("GET {} -> {}", url, status);
        Ok(Response { status, body })
    }

    async fn download(
        &self,
        url: &Url,
        credentials: Option<&Credentials>,
        destination: &Path,
        on_chunk: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<Download, NetworkError> {
        let mut response = self.request(url, credentials).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await?.to_vec();
            return Ok(Download::Rejected(Response {
                status: status.as_u16(),
                body,
            }));
        }

        let bytes = write_stream(response.bytes_stream(), destination, on_chunk).await?;
        Ok(Download::Completed { bytes })
    }
}

/// Write `chunks` to a new file at `destination` and return the number of bytes.
///
/// If the stream or a write fails, the partial file is removed again.
async fn write_stream<S, B, E>(
    mut chunks: S,
    destination: &Path,
    on_chunk: &(dyn Fn(u64) + Send + Sync),
) -> Result<u64, NetworkError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    NetworkError: From<E>,
{
    let mut file = tokio::fs::File::create(destination).await?;
    let mut bytes = 0u64;
    let result = async {
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let chunk = chunk.as_ref();
            file.write_all(chunk).await?;
            bytes += chunk.len() as u64;
            on_chunk(chunk.len() as u64);
        }
        file.flush().await?;
        Ok::<_, NetworkError>(bytes)
    }
    .await;
    drop(file);

    if let Err(err) = &result {
        tracing::debug!(
            "Removing incomplete download {}: {err}",
            destination.display()
        );
        if let Err(remove_err) = tokio::fs::remove_file(destination).await {
            tracing::warn!(
                "Failed to remove incomplete download {}: {remove_err}",
                destination.display()
            );
        }
    }
    result
}

/// Builder for configuring a BaseClient
#[derive(Debug, Clone)]
pub struct BaseClientBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
}

impl Default for BaseClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: 5 * 60, // 5 minutes default
        }
    }
}

impl BaseClientBuilder {
    /// Set a custom user agent string
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the read timeout in seconds
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Build the BaseClient with the configured settings
    pub fn build(self) -> Result<BaseClient, NetworkError> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let client = reqwest::Client::builder()
            .no_gzip()
            .user_agent(user_agent)
            .read_timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?;

        Ok(BaseClient { client })
    }
}
