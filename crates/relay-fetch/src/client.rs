//! Origin fetch client.

use async_trait::async_trait;
use http::{HeaderMap, Response, StatusCode};
use tracing::debug;

use crate::timeout::TimeoutConfig;

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {status} for {url}")]
    Http { status: StatusCode, url: String },

    #[error("Timeout fetching {0}")]
    Timeout(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Request error: {0}")]
    Request(String),
}

/// The network seam of the worker.
///
/// `path` is either an absolute URL or a path relative to the origin.
/// Non-success statuses are returned as responses, not errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a resource from the origin.
    async fn fetch(&self, path: &str) -> Result<Response<Vec<u8>>, FetchError>;
}

/// Fetch and require a 2xx status.
pub async fn fetch_ok(
    fetcher: &dyn Fetcher,
    path: &str,
) -> Result<Response<Vec<u8>>, FetchError> {
    let response = fetcher.fetch(path).await?;
    if !response.status().is_success() {
        return Err(FetchError::Http {
            status: response.status(),
            url: path.to_string(),
        });
    }
    Ok(response)
}

/// reqwest-backed fetcher against an origin base URL.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    /// Create a fetcher for the given origin.
    pub fn new(base_url: impl Into<String>, timeout: TimeoutConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout.connect)
            .timeout(timeout.total)
            .build()
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// The origin base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a path against the origin base URL.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let path = path.trim_start_matches("./").trim_start_matches('/');
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Response<Vec<u8>>, FetchError> {
        let url = self.resolve(path);
        debug!(%url, "fetching from origin");

        let resp = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.clone())
            } else {
                FetchError::Connection(e.to_string())
            }
        })?;

        let status = resp.status();
        let headers: HeaderMap = resp.headers().clone();
        let body = resp.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(url.clone())
            } else {
                FetchError::Request(e.to_string())
            }
        })?;

        let mut response = Response::new(body.to_vec());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
