//! Entry resolution through the resources store.

use std::sync::Arc;

use futures::future::try_join_all;
use http::header::ETAG;
use http::StatusCode;
use relay_cache::{
    build_response, status_response, CacheStorage, HttpResponse, LoadCoalescer, LoadError,
    LoadReport, LoadResult, Manifest, ResponseStore,
};
use relay_core::{RequestContext, WorkerConfig};
use relay_fetch::{fetch_ok, Fetcher};
use relay_observability::WorkerMetrics;
use tracing::{debug, info, warn, Instrument};

/// An entry path extracted from a request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPath {
    path: String,
    stem_end: usize,
}

impl EntryPath {
    /// Extract the entry path from a request URL.
    ///
    /// The path runs from the entries marker to the end of the URL, without
    /// query or fragment. The stem ends at the first `/` or `.` after the
    /// marker, or at the end of the path if there is neither. Returns `None`
    /// when the marker is missing or is not followed by a group name.
    pub fn parse(url: &str, entries_prefix: &str) -> Option<Self> {
        let start = url.find(entries_prefix)?;
        let path = &url[start..];
        let path = path.split(['?', '#']).next().unwrap_or(path);

        let rest = &path[entries_prefix.len()..];
        let stem_end = entries_prefix.len() + rest.find(['/', '.']).unwrap_or(rest.len());
        if stem_end == entries_prefix.len() {
            return None;
        }

        Some(Self {
            path: path.to_string(),
            stem_end,
        })
    }

    /// Full entry path, used as the cache key.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Entry path truncated at the end of the group name.
    pub fn stem(&self) -> &str {
        &self.path[..self.stem_end]
    }

    /// Manifest URL for this entry's group.
    pub fn manifest_url(&self, entries_prefix: &str, resources_prefix: &str) -> String {
        let group = &self.stem()[entries_prefix.len()..];
        format!("{resources_prefix}{group}.json")
    }
}

impl std::fmt::Display for EntryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// Resolves entry requests from the resources store, loading manifests from
/// the origin on a miss.
///
/// `resolve_entry` always produces a response: load failures and missing
/// sub-resources answer 404, a body read that exceeds the configured bound
/// answers 500.
pub struct EntryService {
    config: Arc<WorkerConfig>,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    coalescer: LoadCoalescer,
    metrics: Arc<WorkerMetrics>,
}

impl EntryService {
    /// Create a new entry service.
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            coalescer: LoadCoalescer::new(),
            metrics,
        }
    }

    /// Whether a manifest load is in flight.
    pub fn is_loading(&self, manifest_url: &str) -> bool {
        self.coalescer.is_in_flight(manifest_url)
    }

    /// Resolve an entry request into a response.
    pub async fn resolve_entry(&self, request_url: &str) -> HttpResponse {
        let ctx = RequestContext::new(request_url);
        let span = tracing::debug_span!("entry", request_id = %ctx.request_id, url = %ctx.url);

        let response = self.resolve(&ctx).instrument(span).await;
        debug!(
            request_id = %ctx.request_id,
            status = response.status().as_u16(),
            elapsed_us = ctx.elapsed().as_micros() as u64,
            "entry resolved"
        );
        response
    }

    async fn resolve(&self, ctx: &RequestContext) -> HttpResponse {
        let Some(entry) = EntryPath::parse(&ctx.url, &self.config.entries_prefix) else {
            debug!("no entry path in request");
            self.metrics.record_not_found();
            return status_response(StatusCode::NOT_FOUND);
        };

        let store = match self.storage.open(&self.config.resources_store) {
            Ok(store) => store,
            Err(e) => {
                warn!(error = %e, "resources store unavailable");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        if let Some(response) = self.cached(&store, &entry).await {
            self.metrics.record_cache_hit();
            return response;
        }
        self.metrics.record_cache_miss();

        let manifest_url =
            entry.manifest_url(&self.config.entries_prefix, &self.config.resources_prefix);

        let report = self.load(&manifest_url, &store).await;
        if report.joined() {
            if let Some(response) = self.cached(&store, &entry).await {
                return response;
            }
            debug!(%entry, manifest = %manifest_url, "entry absent after shared load, retrying");
            self.load(&manifest_url, &store).await;
        }

        self.read_back(&store, &entry).await
    }

    async fn cached(&self, store: &Arc<dyn ResponseStore>, entry: &EntryPath) -> Option<HttpResponse> {
        match store.get(entry.as_str()).await {
            Ok(found) => found.map(|response| response.into_http()),
            Err(e) => {
                warn!(%entry, error = %e, "resources store lookup failed");
                None
            }
        }
    }

    async fn load(&self, manifest_url: &str, store: &Arc<dyn ResponseStore>) -> LoadReport {
        let fetcher = Arc::clone(&self.fetcher);
        let store = Arc::clone(store);
        let metrics = Arc::clone(&self.metrics);
        let url = manifest_url.to_string();

        let report = self
            .coalescer
            .run(manifest_url, move || populate(fetcher, store, url, metrics))
            .await;

        if report.joined() {
            self.metrics.record_coalesced_join();
        } else if let Err(e) = &report.result {
            warn!(manifest = %manifest_url, error = %e, "manifest load failed");
            self.metrics.record_load_failure();
        }
        report
    }

    async fn read_back(&self, store: &Arc<dyn ResponseStore>, entry: &EntryPath) -> HttpResponse {
        let head = match store.lookup(entry.as_str()).await {
            Ok(Some(head)) => head,
            Ok(None) => {
                debug!(%entry, "entry not in manifest");
                self.metrics.record_not_found();
                return status_response(StatusCode::NOT_FOUND);
            }
            Err(e) => {
                warn!(%entry, error = %e, "resources store lookup failed");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        let timeout = self.config.body_read_timeout();
        match tokio::time::timeout(timeout, store.read_body(entry.as_str())).await {
            Ok(Ok(Some(body))) => build_response(body, &head.content_type, None),
            Ok(Ok(None)) => {
                self.metrics.record_not_found();
                status_response(StatusCode::NOT_FOUND)
            }
            Ok(Err(e)) => {
                warn!(%entry, error = %e, "reading cached body failed");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Err(_) => {
                warn!(%entry, ?timeout, "reading cached body timed out");
                self.metrics.record_read_timeout();
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

/// Fetch a manifest, decode it and write every sub-resource to `store`.
///
/// Nothing is written unless the whole manifest decodes; the writes are
/// issued concurrently and joined before the load completes.
async fn populate(
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ResponseStore>,
    manifest_url: String,
    metrics: Arc<WorkerMetrics>,
) -> LoadResult {
    metrics.record_manifest_fetch();

    let response = fetch_ok(fetcher.as_ref(), &manifest_url)
        .await
        .map_err(|e| LoadError::Fetch(e.to_string()))?;

    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(String::from);

    let manifest = Manifest::from_json(response.body(), etag)
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    let entries = manifest
        .decode_all()
        .map_err(|e| LoadError::Decode(e.to_string()))?;
    let count = entries.len();

    try_join_all(entries.into_iter().map(|(url, cached)| {
        let store = Arc::clone(&store);
        async move { store.put(&url, cached).await }
    }))
    .await
    .map_err(|e| LoadError::Store(e.to_string()))?;

    info!(manifest = %manifest_url, entries = count, "populated resources from manifest");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
    use relay_cache::{CacheResult, CachedResponse, MemoryStore, ResponseHead};
    use relay_fetch::MemoryOrigin;

    const PREFIX: &str = "/entries/";

    fn manifest_json(entries: &[(&str, &str)]) -> String {
        let map: serde_json::Map<String, serde_json::Value> = entries
            .iter()
            .map(|(url, body)| {
                (url.to_string(), serde_json::json!({ "data": STANDARD.encode(body) }))
            })
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    fn service(origin: Arc<MemoryOrigin>) -> (EntryService, Arc<WorkerMetrics>) {
        service_with_storage(origin, CacheStorage::in_memory())
    }

    fn service_with_storage(
        origin: Arc<MemoryOrigin>,
        storage: CacheStorage,
    ) -> (EntryService, Arc<WorkerMetrics>) {
        let metrics = Arc::new(WorkerMetrics::new());
        let service = EntryService::new(
            Arc::new(WorkerConfig::default()),
            Arc::new(storage),
            origin,
            Arc::clone(&metrics),
        );
        (service, metrics)
    }

    #[test]
    fn test_parse_stops_at_first_dot_or_slash() {
        let entry = EntryPath::parse("https://app.example.com/entries/bar.js", PREFIX).unwrap();
        assert_eq!(entry.as_str(), "/entries/bar.js");
        assert_eq!(entry.stem(), "/entries/bar");
        assert_eq!(entry.manifest_url(PREFIX, "/resources/"), "/resources/bar.json");

        let nested = EntryPath::parse("/entries/bar/styles.v2.css", PREFIX).unwrap();
        assert_eq!(nested.stem(), "/entries/bar");

        let dotted = EntryPath::parse("/entries/bar.min/x.js", PREFIX).unwrap();
        assert_eq!(dotted.stem(), "/entries/bar");
    }

    #[test]
    fn test_parse_without_separator_uses_whole_path() {
        let entry = EntryPath::parse("/entries/bar", PREFIX).unwrap();
        assert_eq!(entry.stem(), "/entries/bar");
        assert_eq!(entry.manifest_url(PREFIX, "/resources/"), "/resources/bar.json");
    }

    #[test]
    fn test_parse_strips_query_and_rejects_empty_group() {
        let entry = EntryPath::parse("/entries/bar.js?v=3#top", PREFIX).unwrap();
        assert_eq!(entry.as_str(), "/entries/bar.js");

        assert!(EntryPath::parse("/entries/", PREFIX).is_none());
        assert!(EntryPath::parse("/entries/.js", PREFIX).is_none());
        assert!(EntryPath::parse("/static/bar.js", PREFIX).is_none());
    }

    #[tokio::test]
    async fn test_first_request_populates_and_returns_200() {
        let origin = Arc::new(MemoryOrigin::new().with_tagged_body(
            "/resources/bar.json",
            manifest_json(&[("/entries/bar.js", "x")]),
            "\"m1\"",
        ));
        let (service, _) = service(Arc::clone(&origin));

        let response = service.resolve_entry("/entries/bar.js").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"x");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/javascript");
        assert_eq!(response.headers()[CONTENT_LENGTH], "1");
        assert!(response.headers().get(ETAG).is_none());
        assert_eq!(origin.hits("/resources/bar.json"), 1);
    }

    #[tokio::test]
    async fn test_fast_path_skips_network_and_keeps_etag() {
        let origin = Arc::new(MemoryOrigin::new().with_tagged_body(
            "/resources/bar.json",
            manifest_json(&[("/entries/bar.js", "x")]),
            "\"m1\"",
        ));
        let (service, metrics) = service(Arc::clone(&origin));

        let first = service.resolve_entry("/entries/bar.js").await;
        let second = service.resolve_entry("/entries/bar.js").await;
        let third = service.resolve_entry("/entries/bar.js").await;

        assert_eq!(origin.hits("/resources/bar.json"), 1);
        assert_eq!(first.body(), second.body());
        assert_eq!(second.body(), third.body());
        assert_eq!(first.headers()[CONTENT_TYPE], third.headers()[CONTENT_TYPE]);
        assert_eq!(second.headers()[ETAG], "\"m1\"");
        assert_eq!(metrics.snapshot().cache_hits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_fetch_manifest_once() {
        let origin = Arc::new(
            MemoryOrigin::new()
                .with_body(
                    "/resources/app.json",
                    manifest_json(&[
                        ("/entries/app.js", "js"),
                        ("/entries/app.css", "css"),
                        ("/entries/app/chunk.js", "chunk"),
                    ]),
                )
                .with_delay("/resources/app.json", Duration::from_millis(200)),
        );
        let (service, metrics) = service(Arc::clone(&origin));

        let responses = futures::future::join_all(
            ["/entries/app.js", "/entries/app.css", "/entries/app/chunk.js"]
                .iter()
                .map(|url| service.resolve_entry(url)),
        )
        .await;

        assert_eq!(origin.hits("/resources/app.json"), 1);
        assert!(responses.iter().all(|r| r.status() == StatusCode::OK));
        assert_eq!(responses[1].headers()[CONTENT_TYPE], "text/css");
        assert_eq!(responses[2].body(), b"chunk");
        assert_eq!(metrics.snapshot().coalesced_joins, 2);
        assert!(!service.is_loading("/resources/app.json"));
    }

    #[tokio::test]
    async fn test_absent_key_yields_404() {
        let origin = Arc::new(MemoryOrigin::new().with_body(
            "/resources/bar.json",
            manifest_json(&[("/entries/bar.js", "x")]),
        ));
        let (service, _) = service(origin);

        let response = service.resolve_entry("/entries/bar/missing.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_failed_fetch_yields_404_and_caches_nothing() {
        let origin = Arc::new(MemoryOrigin::new().with_failure("/resources/bar.json", "refused"));
        let (service, metrics) = service(Arc::clone(&origin));

        let response = service.resolve_entry("/entries/bar.js").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(metrics.snapshot().load_failures, 1);

        // A later request retries the fetch.
        service.resolve_entry("/entries/bar.js").await;
        assert_eq!(origin.hits("/resources/bar.json"), 2);
    }

    #[tokio::test]
    async fn test_malformed_manifest_yields_404() {
        let origin = Arc::new(
            MemoryOrigin::new()
                .with_body("/resources/bad.json", "not json")
                .with_body("/resources/half.json", r#"{"/entries/half.js": {"data": "eA=="}, "/entries/half.css": {"data": "!!"}}"#),
        );
        let (service, _) = service(origin);

        assert_eq!(service.resolve_entry("/entries/bad.js").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(service.resolve_entry("/entries/half.js").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiters_of_failed_load_retry_then_404() {
        let origin = Arc::new(
            MemoryOrigin::new()
                .with_failure("/resources/bar.json", "refused")
                .with_delay("/resources/bar.json", Duration::from_millis(100)),
        );
        let (service, _) = service(Arc::clone(&origin));

        let (a, b) = tokio::join!(
            service.resolve_entry("/entries/bar.js"),
            service.resolve_entry("/entries/bar.css"),
        );

        assert_eq!(a.status(), StatusCode::NOT_FOUND);
        assert_eq!(b.status(), StatusCode::NOT_FOUND);
        assert_eq!(origin.hits("/resources/bar.json"), 2);
    }

    #[tokio::test]
    async fn test_no_marker_yields_404_without_fetch() {
        let origin = Arc::new(MemoryOrigin::new());
        let (service, _) = service(Arc::clone(&origin));

        let response = service.resolve_entry("/assets/logo.png").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(origin.total_hits(), 0);
    }

    /// Store whose body reads never finish in time.
    struct SlowBodyStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl ResponseStore for SlowBodyStore {
        async fn put(&self, key: &str, response: CachedResponse) -> CacheResult<()> {
            self.inner.put(key, response).await
        }
        async fn lookup(&self, key: &str) -> CacheResult<Option<ResponseHead>> {
            self.inner.lookup(key).await
        }
        async fn read_body(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
            tokio::time::sleep(self.delay).await;
            self.inner.read_body(key).await
        }
        async fn keys(&self) -> CacheResult<Vec<String>> {
            self.inner.keys().await
        }
        async fn clear(&self) -> CacheResult<()> {
            self.inner.clear().await
        }
        async fn get(&self, _key: &str) -> CacheResult<Option<CachedResponse>> {
            // Force every request through the load and read-back path.
            Ok(None)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_body_read_yields_500() {
        let origin = Arc::new(MemoryOrigin::new().with_body(
            "/resources/bar.json",
            manifest_json(&[("/entries/bar.js", "x")]),
        ));
        let storage = CacheStorage::with_factory(|_| {
            Ok(Arc::new(SlowBodyStore {
                inner: MemoryStore::new(),
                delay: Duration::from_secs(60),
            }) as Arc<dyn ResponseStore>)
        });
        let (service, metrics) = service_with_storage(origin, storage);

        let response = service.resolve_entry("/entries/bar.js").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(metrics.snapshot().read_timeouts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_body_read_within_bound_succeeds() {
        let origin = Arc::new(MemoryOrigin::new().with_body(
            "/resources/bar.json",
            manifest_json(&[("/entries/bar.js", "x")]),
        ));
        let storage = CacheStorage::with_factory(|_| {
            Ok(Arc::new(SlowBodyStore {
                inner: MemoryStore::new(),
                delay: Duration::from_secs(4),
            }) as Arc<dyn ResponseStore>)
        });
        let (service, _) = service_with_storage(origin, storage);

        let response = service.resolve_entry("/entries/bar.js").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
