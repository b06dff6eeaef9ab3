//! Fetch-event dispatch.

use std::sync::Arc;

use http::StatusCode;
use relay_cache::{status_response, CacheStorage, HttpResponse};
use relay_core::WorkerConfig;
use relay_fetch::Fetcher;
use relay_observability::WorkerMetrics;
use tracing::{debug, warn};

use crate::entry::EntryService;

/// Outcome of offering a request to the worker.
#[derive(Debug)]
pub enum Intercept {
    /// The worker answers the request.
    Respond(HttpResponse),
    /// The request goes to the network untouched.
    Passthrough,
}

impl Intercept {
    /// The response, if the request was intercepted.
    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            Self::Respond(response) => Some(response),
            Self::Passthrough => None,
        }
    }

    /// Whether the request was intercepted.
    pub fn is_intercepted(&self) -> bool {
        matches!(self, Self::Respond(_))
    }
}

/// How a request URL is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKind {
    /// Resolved by the entry service.
    Entry,
    /// Shell asset served from the static store, keyed by the matched route.
    Shell(String),
    /// Not intercepted.
    Passthrough,
}

/// Dispatches intercepted requests to the entry service or the static store.
pub struct Router {
    config: Arc<WorkerConfig>,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    entries: Arc<EntryService>,
    metrics: Arc<WorkerMetrics>,
}

impl Router {
    /// Create a router over an entry service.
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        entries: Arc<EntryService>,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            entries,
            metrics,
        }
    }

    /// Decide how a request URL is handled.
    pub fn classify(&self, url: &str) -> RouteKind {
        let path = request_path(url);
        if path.contains(self.config.entries_prefix.as_str()) {
            return RouteKind::Entry;
        }
        self.config
            .shell_routes
            .iter()
            .find(|route| path.ends_with(route.as_str()))
            .map(|route| RouteKind::Shell(route.clone()))
            .unwrap_or(RouteKind::Passthrough)
    }

    /// Handle a fetch event for `url`.
    pub async fn handle(&self, url: &str) -> Intercept {
        match self.classify(url) {
            RouteKind::Entry => Intercept::Respond(self.entries.resolve_entry(url).await),
            RouteKind::Shell(key) => Intercept::Respond(self.serve_shell(url, &key).await),
            RouteKind::Passthrough => Intercept::Passthrough,
        }
    }

    async fn serve_shell(&self, url: &str, key: &str) -> HttpResponse {
        match self.storage.open(&self.config.static_store) {
            Ok(store) => match store.get(key).await {
                Ok(Some(cached)) => {
                    self.metrics.record_static_hit();
                    return cached.into_http();
                }
                Ok(None) => {}
                Err(e) => warn!(key, error = %e, "static store lookup failed"),
            },
            Err(e) => warn!(error = %e, "static store unavailable"),
        }

        self.metrics.record_static_fallback();
        let target = url.split('#').next().unwrap_or(url);
        debug!(url = target, "shell asset not cached, fetching");
        match self.fetcher.fetch(target).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = target, error = %e, "shell asset fetch failed");
                status_response(StatusCode::BAD_GATEWAY)
            }
        }
    }
}

/// Path portion of a URL, without scheme, host, query or fragment.
fn request_path(url: &str) -> &str {
    let path = match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map(|i| &rest[i..]).unwrap_or("/")
        }
        None => url,
    };
    path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, ETAG};
    use http::HeaderValue;
    use relay_cache::CachedResponse;
    use relay_fetch::MemoryOrigin;

    fn router(origin: Arc<MemoryOrigin>, storage: Arc<CacheStorage>) -> (Router, Arc<WorkerMetrics>) {
        let config = Arc::new(WorkerConfig::default());
        let metrics = Arc::new(WorkerMetrics::new());
        let entries = Arc::new(EntryService::new(
            Arc::clone(&config),
            Arc::clone(&storage),
            Arc::clone(&origin) as Arc<dyn Fetcher>,
            Arc::clone(&metrics),
        ));
        let router = Router::new(config, storage, origin, entries, Arc::clone(&metrics));
        (router, metrics)
    }

    #[test]
    fn test_request_path() {
        assert_eq!(request_path("https://app.example.com/entries/a.js?v=1"), "/entries/a.js");
        assert_eq!(request_path("https://app.example.com"), "/");
        assert_eq!(request_path("/index.html#top"), "/index.html");
    }

    #[test]
    fn test_classify() {
        let (router, _) = router(Arc::new(MemoryOrigin::new()), Arc::new(CacheStorage::in_memory()));

        assert_eq!(router.classify("https://x.test/entries/bar.js"), RouteKind::Entry);
        assert_eq!(
            router.classify("https://x.test/app/main.js"),
            RouteKind::Shell("/main.js".to_string())
        );
        assert_eq!(
            router.classify("/index.html?utm=1"),
            RouteKind::Shell("/index.html".to_string())
        );
        assert_eq!(router.classify("https://x.test/api/cart"), RouteKind::Passthrough);
        assert_eq!(router.classify("https://x.test/domain.js"), RouteKind::Passthrough);
    }

    #[tokio::test]
    async fn test_shell_served_from_static_store() {
        let origin = Arc::new(MemoryOrigin::new());
        let storage = Arc::new(CacheStorage::in_memory());
        storage
            .open("static")
            .unwrap()
            .put(
                "/main.js",
                CachedResponse::new(b"boot()".to_vec(), HeaderValue::from_static("application/javascript"))
                    .with_etag(HeaderValue::from_static("\"s1\"")),
            )
            .await
            .unwrap();
        let (router, metrics) = router(Arc::clone(&origin), storage);

        let response = router.handle("https://x.test/main.js").await.into_response().unwrap();

        assert_eq!(response.body(), b"boot()");
        assert_eq!(response.headers()[ETAG], "\"s1\"");
        assert_eq!(origin.total_hits(), 0);
        assert_eq!(metrics.snapshot().static_hits, 1);
    }

    #[tokio::test]
    async fn test_shell_falls_back_to_network() {
        let origin = Arc::new(MemoryOrigin::new().with_body("/index.html", "<html>"));
        let (router, metrics) = router(Arc::clone(&origin), Arc::new(CacheStorage::in_memory()));

        let response = router.handle("/index.html").await.into_response().unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"<html>");
        assert!(response.headers().get(CONTENT_TYPE).is_none());
        assert_eq!(origin.hits("/index.html"), 1);
        assert_eq!(metrics.snapshot().static_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_shell_network_failure_is_bad_gateway() {
        let origin = Arc::new(MemoryOrigin::new().with_failure("/main.js", "offline"));
        let (router, _) = router(origin, Arc::new(CacheStorage::in_memory()));

        let response = router.handle("/main.js").await.into_response().unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_passthrough_is_not_intercepted() {
        let origin = Arc::new(MemoryOrigin::new());
        let (router, _) = router(Arc::clone(&origin), Arc::new(CacheStorage::in_memory()));

        let intercept = router.handle("https://x.test/api/cart").await;
        assert!(!intercept.is_intercepted());
        assert_eq!(origin.total_hits(), 0);
    }
}
