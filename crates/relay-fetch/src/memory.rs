//! In-process origin for development and tests.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use http::header::ETAG;
use http::{HeaderValue, Response, StatusCode};

use crate::client::{FetchError, Fetcher};

#[derive(Debug, Clone)]
enum Route {
    Respond {
        status: StatusCode,
        body: Vec<u8>,
        etag: Option<String>,
    },
    Fail(String),
}

#[derive(Debug, Default)]
struct OriginState {
    routes: HashMap<String, Route>,
    delays: HashMap<String, Duration>,
    hits: HashMap<String, usize>,
}

/// Origin served from memory.
///
/// Unknown paths answer 404. Every fetch is counted per path, which makes
/// the origin useful for asserting how often the worker went to the network.
#[derive(Debug, Default)]
pub struct MemoryOrigin {
    state: Mutex<OriginState>,
}

impl MemoryOrigin {
    /// Create an origin with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `path`.
    pub fn with_body(self, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.serve(path, StatusCode::OK, body, None);
        self
    }

    /// Serve `body` with status 200 and an ETag at `path`.
    pub fn with_tagged_body(
        self,
        path: impl Into<String>,
        body: impl Into<Vec<u8>>,
        etag: impl Into<String>,
    ) -> Self {
        self.serve(path, StatusCode::OK, body, Some(etag.into()));
        self
    }

    /// Serve an empty response with the given status at `path`.
    pub fn with_status(self, path: impl Into<String>, status: StatusCode) -> Self {
        self.serve(path, status, Vec::new(), None);
        self
    }

    /// Fail every fetch of `path` with a connection error.
    pub fn with_failure(self, path: impl Into<String>, reason: impl Into<String>) -> Self {
        self.lock().routes.insert(path.into(), Route::Fail(reason.into()));
        self
    }

    /// Delay every fetch of `path`.
    pub fn with_delay(self, path: impl Into<String>, delay: Duration) -> Self {
        self.lock().delays.insert(path.into(), delay);
        self
    }

    /// Replace the route at `path` on a shared origin.
    pub fn serve(
        &self,
        path: impl Into<String>,
        status: StatusCode,
        body: impl Into<Vec<u8>>,
        etag: Option<String>,
    ) {
        self.lock().routes.insert(
            path.into(),
            Route::Respond {
                status,
                body: body.into(),
                etag,
            },
        );
    }

    /// Number of fetches of `path` so far.
    pub fn hits(&self, path: &str) -> usize {
        self.lock().hits.get(path).copied().unwrap_or(0)
    }

    /// Number of fetches across all paths.
    pub fn total_hits(&self) -> usize {
        self.lock().hits.values().sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OriginState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Fetcher for MemoryOrigin {
    async fn fetch(&self, path: &str) -> Result<Response<Vec<u8>>, FetchError> {
        let (route, delay) = {
            let mut state = self.lock();
            *state.hits.entry(path.to_string()).or_default() += 1;
            (state.routes.get(path).cloned(), state.delays.get(path).copied())
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match route {
            Some(Route::Respond { status, body, etag }) => {
                let mut response = Response::new(body);
                *response.status_mut() = status;
                if let Some(etag) = etag.and_then(|e| HeaderValue::from_str(&e).ok()) {
                    response.headers_mut().insert(ETAG, etag);
                }
                Ok(response)
            }
            Some(Route::Fail(reason)) => Err(FetchError::Connection(reason)),
            None => {
                let mut response = Response::new(Vec::new());
                *response.status_mut() = StatusCode::NOT_FOUND;
                Ok(response)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fetch_ok;

    #[tokio::test]
    async fn test_serves_routes_and_counts_hits() {
        let origin = MemoryOrigin::new().with_tagged_body("/a", "hello", "\"v1\"");

        let response = origin.fetch("/a").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"hello");
        assert_eq!(response.headers()[ETAG], "\"v1\"");

        origin.fetch("/a").await.unwrap();
        assert_eq!(origin.hits("/a"), 2);
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let origin = MemoryOrigin::new();

        let response = origin.fetch("/nope").await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(matches!(
            fetch_ok(&origin, "/nope").await,
            Err(FetchError::Http { status, .. }) if status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn test_failure_route() {
        let origin = MemoryOrigin::new().with_failure("/down", "refused");
        assert!(matches!(
            origin.fetch("/down").await,
            Err(FetchError::Connection(reason)) if reason == "refused"
        ));
        assert_eq!(origin.total_hits(), 1);
    }
}
