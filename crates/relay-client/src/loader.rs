//! Module loading.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use relay_core::WorkerConfig;
use relay_fetch::{fetch_ok, Fetcher};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::importer::{ImportOutcome, StyleError, StyleImporter};

/// Default bound on loading a module.
pub const DEFAULT_MODULE_TIMEOUT: Duration = Duration::from_secs(10);

/// A loaded code module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedModule {
    /// Module payload.
    pub data: serde_json::Value,
    /// Stylesheets the module needs, in order.
    #[serde(default)]
    pub stylesheets: Vec<String>,
}

/// Error loading a module.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("loading {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },

    #[error("failed to import {url}: {reason}")]
    Import { url: String, reason: String },

    #[error(transparent)]
    Style(#[from] StyleError),
}

/// Source of code modules.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Import the module at `url`.
    async fn import(&self, url: &str) -> Result<LoadedModule, LoaderError>;
}

/// Modules served as JSON documents through a `Fetcher`.
pub struct FetchModuleSource {
    fetcher: Arc<dyn Fetcher>,
}

impl FetchModuleSource {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl ModuleSource for FetchModuleSource {
    async fn import(&self, url: &str) -> Result<LoadedModule, LoaderError> {
        let import_error = |reason: String| LoaderError::Import {
            url: url.to_string(),
            reason,
        };

        let response = fetch_ok(self.fetcher.as_ref(), url)
            .await
            .map_err(|e| import_error(e.to_string()))?;
        serde_json::from_slice(response.body()).map_err(|e| import_error(e.to_string()))
    }
}

/// A module together with the outcome of each of its stylesheets.
#[derive(Debug, Clone)]
pub struct ModuleWithStyles {
    pub module: LoadedModule,
    /// One outcome per entry of `module.stylesheets`, in the same order.
    pub styles: Vec<ImportOutcome>,
}

/// Loads modules with a time bound and applies their stylesheets.
pub struct ModuleLoader {
    source: Arc<dyn ModuleSource>,
    styles: StyleImporter,
    timeout: Duration,
}

impl ModuleLoader {
    /// Create a loader with the default timeout.
    pub fn new(source: Arc<dyn ModuleSource>, styles: StyleImporter) -> Self {
        Self {
            source,
            styles,
            timeout: DEFAULT_MODULE_TIMEOUT,
        }
    }

    /// Use the module timeout of `config`.
    pub fn with_config(mut self, config: &WorkerConfig) -> Self {
        self.timeout = config.module_load_timeout();
        self
    }

    /// Set the module timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The importer used for module stylesheets.
    pub fn styles(&self) -> &StyleImporter {
        &self.styles
    }

    /// Load a module, failing if it takes longer than the configured timeout.
    pub async fn load_module(&self, url: &str) -> Result<LoadedModule, LoaderError> {
        match tokio::time::timeout(self.timeout, self.source.import(url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(url, timeout = ?self.timeout, "module load timed out");
                Err(LoaderError::Timeout {
                    url: url.to_string(),
                    after: self.timeout,
                })
            }
        }
    }

    /// Load a module, then add all of its stylesheets concurrently.
    ///
    /// Stylesheets that fail or time out do not fail the load; a missing
    /// carrier does.
    pub async fn load_with_styles(&self, url: &str) -> Result<ModuleWithStyles, LoaderError> {
        let module = self.load_module(url).await?;
        debug!(url, stylesheets = module.stylesheets.len(), "module loaded");

        let styles = join_all(
            module
                .stylesheets
                .iter()
                .map(|sheet| self.styles.add_stylesheet(sheet)),
        )
        .await
        .into_iter()
        .collect::<Result<Vec<_>, StyleError>>()?;

        Ok(ModuleWithStyles { module, styles })
    }
}
