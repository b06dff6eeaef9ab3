//! Lifecycle controller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use futures::future::try_join_all;
use http::header::{CONTENT_TYPE, ETAG};
use http::HeaderValue;
use relay_cache::{CacheError, CacheStorage, CachedResponse, DEFAULT_CONTENT_TYPE};
use relay_core::{LifecycleEvent, LifecycleObserver, LifecyclePhase, WorkerConfig};
use relay_fetch::{fetch_ok, Fetcher};
use tracing::{debug, info};

/// Error reported by the host's client registry.
#[derive(Debug, Clone, thiserror::Error)]
#[error("client registry error: {0}")]
pub struct ClientError(pub String);

/// The host's view of the clients this worker may control.
#[async_trait]
pub trait ClientRegistry: Send + Sync {
    /// Activate this generation without waiting for old clients to close.
    async fn skip_waiting(&self) -> Result<(), ClientError>;

    /// Take control of every open client.
    async fn claim(&self) -> Result<(), ClientError>;
}

/// Registry for hosts without clients to control.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoClients;

#[async_trait]
impl ClientRegistry for NoClients {
    async fn skip_waiting(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn claim(&self) -> Result<(), ClientError> {
        Ok(())
    }
}

/// Error handling a lifecycle event.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Clients(#[from] ClientError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to install shell asset {asset}: {reason}")]
    ShellAsset { asset: String, reason: String },

    #[error("worker has been superseded")]
    Superseded,
}

/// Drives store resets and client control from lifecycle events.
///
/// Events run to completion or fail; nothing is retried. Once superseded,
/// every later event is rejected.
pub struct LifecycleController {
    config: Arc<WorkerConfig>,
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    clients: Arc<dyn ClientRegistry>,
    phase: Mutex<Option<LifecyclePhase>>,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl LifecycleController {
    /// Create a controller that has seen no events.
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
        clients: Arc<dyn ClientRegistry>,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            clients,
            phase: Mutex::new(None),
            observers: Vec::new(),
        }
    }

    /// Add an observer notified after every handled event.
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Current phase, `None` before the first event.
    pub fn phase(&self) -> Option<LifecyclePhase> {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a lifecycle event, returning the phase reached.
    pub async fn handle(&self, event: LifecycleEvent) -> Result<LifecyclePhase, LifecycleError> {
        if self.phase() == Some(LifecyclePhase::Superseded) {
            return Err(LifecycleError::Superseded);
        }

        let start = Instant::now();
        debug!(event = event.name(), "handling lifecycle event");

        let phase = match &event {
            LifecycleEvent::Install => {
                self.set_phase(LifecyclePhase::Installing);
                self.install().await?;
                LifecyclePhase::Installed
            }
            LifecycleEvent::Activate => {
                self.clients.claim().await?;
                LifecyclePhase::Active
            }
            LifecycleEvent::Sync(_) | LifecycleEvent::Message(_) => {
                let (claimed, deleted) = futures::join!(
                    self.clients.claim(),
                    self.storage.delete(&self.config.resources_store),
                );
                claimed?;
                deleted?;
                self.phase().unwrap_or(LifecyclePhase::Active)
            }
            LifecycleEvent::Supersede => LifecyclePhase::Superseded,
        };

        self.set_phase(phase);
        let elapsed = start.elapsed();
        for observer in &self.observers {
            observer.on_transition(&event, phase, elapsed);
        }

        info!(event = event.name(), %phase, elapsed_ms = elapsed.as_millis() as u64, "lifecycle event handled");
        Ok(phase)
    }

    async fn install(&self) -> Result<(), LifecycleError> {
        let (skipped, static_deleted, resources_deleted) = futures::join!(
            self.clients.skip_waiting(),
            self.storage.delete(&self.config.static_store),
            self.storage.delete(&self.config.resources_store),
        );
        skipped?;
        static_deleted?;
        resources_deleted?;

        let store = self.storage.open(&self.config.static_store)?;
        try_join_all(self.config.shell_assets.iter().map(|asset| {
            let store = Arc::clone(&store);
            async move {
                let cached = self.fetch_shell_asset(asset).await?;
                store.put(asset, cached).await?;
                Ok::<_, LifecycleError>(())
            }
        }))
        .await?;

        debug!(assets = self.config.shell_assets.len(), "static store populated");
        Ok(())
    }

    async fn fetch_shell_asset(&self, asset: &str) -> Result<CachedResponse, LifecycleError> {
        let response = fetch_ok(self.fetcher.as_ref(), asset)
            .await
            .map_err(|e| LifecycleError::ShellAsset {
                asset: asset.to_string(),
                reason: e.to_string(),
            })?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
        let etag = response.headers().get(ETAG).cloned();

        let mut cached = CachedResponse::new(response.into_body(), content_type);
        if let Some(etag) = etag {
            cached = cached.with_etag(etag);
        }
        Ok(cached)
    }

    fn set_phase(&self, phase: LifecyclePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = Some(phase);
    }
}
