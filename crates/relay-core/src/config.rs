//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a relay worker.
///
/// Every field has a default, so a partial TOML/JSON document deserializes
/// into a usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker version, used for log correlation across upgrades.
    pub version: String,
    /// Path marker identifying entry requests (e.g., "/entries/").
    pub entries_prefix: String,
    /// Path prefix manifests are fetched from (e.g., "/resources/").
    pub resources_prefix: String,
    /// Name of the store holding page shell assets.
    pub static_store: String,
    /// Name of the store holding manifest sub-resources.
    pub resources_store: String,
    /// Shell assets fetched into the static store on install.
    pub shell_assets: Vec<String>,
    /// URL suffixes answered from the static store.
    pub shell_routes: Vec<String>,
    /// Upper bound on reading a cached body back, in milliseconds.
    pub body_read_timeout_ms: u64,
    /// Upper bound on waiting for a stylesheet import signal, in milliseconds.
    pub style_import_timeout_ms: u64,
    /// Upper bound on loading a code module, in milliseconds.
    pub module_load_timeout_ms: u64,
    /// Selector of the carrier stylesheet element.
    pub carrier_selector: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            entries_prefix: "/entries/".to_string(),
            resources_prefix: "/resources/".to_string(),
            static_store: "static".to_string(),
            resources_store: "resources".to_string(),
            shell_assets: vec!["/main.js".to_string()],
            shell_routes: vec!["/main.js".to_string(), "/index.html".to_string()],
            body_read_timeout_ms: 5_000,
            style_import_timeout_ms: 10_000,
            module_load_timeout_ms: 10_000,
            carrier_selector: "#import-sheet".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entries and resources namespace prefixes.
    pub fn with_prefixes(
        mut self,
        entries: impl Into<String>,
        resources: impl Into<String>,
    ) -> Self {
        self.entries_prefix = entries.into();
        self.resources_prefix = resources.into();
        self
    }

    /// Set the shell assets pre-populated on install.
    pub fn with_shell_assets(mut self, assets: Vec<&str>) -> Self {
        self.shell_assets = assets.into_iter().map(String::from).collect();
        self
    }

    /// Set the body read-back timeout.
    pub fn with_body_read_timeout(mut self, timeout: Duration) -> Self {
        self.body_read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the stylesheet import timeout.
    pub fn with_style_import_timeout(mut self, timeout: Duration) -> Self {
        self.style_import_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Body read-back timeout as a `Duration`.
    pub fn body_read_timeout(&self) -> Duration {
        Duration::from_millis(self.body_read_timeout_ms)
    }

    /// Stylesheet import timeout as a `Duration`.
    pub fn style_import_timeout(&self) -> Duration {
        Duration::from_millis(self.style_import_timeout_ms)
    }

    /// Module load timeout as a `Duration`.
    pub fn module_load_timeout(&self) -> Duration {
        Duration::from_millis(self.module_load_timeout_ms)
    }

    /// Check the configuration for values the worker cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, prefix) in [
            ("entries_prefix", &self.entries_prefix),
            ("resources_prefix", &self.resources_prefix),
        ] {
            if !prefix.starts_with('/') || !prefix.ends_with('/') || prefix.len() < 2 {
                return Err(ConfigError::InvalidPrefix {
                    field,
                    value: prefix.clone(),
                });
            }
        }

        if self.static_store == self.resources_store {
            return Err(ConfigError::StoreNameClash(self.static_store.clone()));
        }

        for (field, value) in [
            ("body_read_timeout_ms", self.body_read_timeout_ms),
            ("style_import_timeout_ms", self.style_import_timeout_ms),
            ("module_load_timeout_ms", self.module_load_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroTimeout(field));
            }
        }

        Ok(())
    }
}

/// Error type for configuration validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must start and end with '/', got {value:?}")]
    InvalidPrefix { field: &'static str, value: String },

    #[error("static and resources stores must differ, both are {0:?}")]
    StoreNameClash(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}
