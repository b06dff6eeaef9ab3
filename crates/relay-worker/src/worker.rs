//! Worker assembly.

use std::sync::Arc;

use relay_cache::{CacheStorage, HttpResponse};
use relay_core::{ConfigError, LifecycleEvent, LifecycleObserver, LifecyclePhase, WorkerConfig};
use relay_fetch::Fetcher;
use relay_observability::WorkerMetrics;

use crate::entry::EntryService;
use crate::lifecycle::{ClientRegistry, LifecycleController, LifecycleError, NoClients};
use crate::router::{Intercept, Router};

/// A resource worker: router, entry service and lifecycle controller sharing
/// one cache storage, origin and set of metrics.
pub struct Worker {
    config: Arc<WorkerConfig>,
    storage: Arc<CacheStorage>,
    entries: Arc<EntryService>,
    router: Router,
    lifecycle: LifecycleController,
    metrics: Arc<WorkerMetrics>,
}

impl Worker {
    /// Start building a worker against an origin.
    pub fn builder(fetcher: Arc<dyn Fetcher>) -> WorkerBuilder {
        WorkerBuilder::new(fetcher)
    }

    /// Handle a fetch event.
    pub async fn handle_fetch(&self, url: &str) -> Intercept {
        self.router.handle(url).await
    }

    /// Resolve an entry request directly.
    pub async fn resolve_entry(&self, url: &str) -> HttpResponse {
        self.entries.resolve_entry(url).await
    }

    /// Handle a lifecycle event.
    pub async fn handle_event(&self, event: LifecycleEvent) -> Result<LifecyclePhase, LifecycleError> {
        self.lifecycle.handle(event).await
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Option<LifecyclePhase> {
        self.lifecycle.phase()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }
}

/// Builder for `Worker`.
pub struct WorkerBuilder {
    fetcher: Arc<dyn Fetcher>,
    config: WorkerConfig,
    storage: Option<Arc<CacheStorage>>,
    clients: Arc<dyn ClientRegistry>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl WorkerBuilder {
    fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            config: WorkerConfig::default(),
            storage: None,
            clients: Arc::new(NoClients),
            observers: Vec::new(),
        }
    }

    /// Use a custom configuration.
    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing cache storage.
    pub fn with_storage(mut self, storage: Arc<CacheStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Use the host's client registry.
    pub fn with_clients(mut self, clients: Arc<dyn ClientRegistry>) -> Self {
        self.clients = clients;
        self
    }

    /// Add a lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Validate the configuration and assemble the worker.
    pub fn build(self) -> Result<Worker, ConfigError> {
        self.config.validate()?;

        let config = Arc::new(self.config);
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(CacheStorage::in_memory()));
        let metrics = Arc::new(WorkerMetrics::new());

        let entries = Arc::new(EntryService::new(
            Arc::clone(&config),
            Arc::clone(&storage),
            Arc::clone(&self.fetcher),
            Arc::clone(&metrics),
        ));
        let router = Router::new(
            Arc::clone(&config),
            Arc::clone(&storage),
            Arc::clone(&self.fetcher),
            Arc::clone(&entries),
            Arc::clone(&metrics),
        );

        let mut lifecycle = LifecycleController::new(
            Arc::clone(&config),
            Arc::clone(&storage),
            self.fetcher,
            self.clients,
        )
        .with_observer(Arc::clone(&metrics) as Arc<dyn LifecycleObserver>);
        for observer in self.observers {
            lifecycle = lifecycle.with_observer(observer);
        }

        Ok(Worker {
            config,
            storage,
            entries,
            router,
            lifecycle,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_fetch::MemoryOrigin;

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = WorkerConfig::default().with_prefixes("entries", "/resources/");
        let result = Worker::builder(Arc::new(MemoryOrigin::new()))
            .with_config(config)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_worker_shares_storage_and_metrics() {
        let storage = Arc::new(CacheStorage::in_memory());
        let origin = Arc::new(MemoryOrigin::new().with_body("/main.js", "boot()"));
        let worker = Worker::builder(origin)
            .with_storage(Arc::clone(&storage))
            .build()
            .unwrap();

        worker.handle_event(LifecycleEvent::Install).await.unwrap();
        let response = worker.handle_fetch("/main.js").await.into_response().unwrap();

        assert_eq!(response.body(), b"boot()");
        assert!(storage.contains("static"));
        assert_eq!(worker.phase(), Some(LifecyclePhase::Installed));
        let snapshot = worker.metrics().snapshot();
        assert_eq!(snapshot.static_hits, 1);
        assert_eq!(snapshot.phase, Some(LifecyclePhase::Installed));
    }
}
