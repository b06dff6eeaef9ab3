//! CLI configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use relay_core::WorkerConfig;
use serde::{Deserialize, Serialize};

/// Config file names, searched from the working directory upward.
pub const CONFIG_NAMES: [&str; 3] = ["relay.toml", ".relay.toml", "relay.json"];

/// CLI configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Origin the worker fetches from.
    #[serde(default)]
    pub origin: OriginConfig,

    /// Worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl CliConfig {
    /// Load config from a file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        if path.ends_with(".json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config: {}", path))
        }
    }

    /// Check the config for errors.
    pub fn validate(&self) -> Result<()> {
        if self.origin.base_url.is_empty() {
            anyhow::bail!("origin.base_url is required");
        }
        if self.origin.timeout_ms == 0 {
            anyhow::bail!("origin.timeout_ms must be positive");
        }
        self.worker.validate().context("Invalid [worker] section")?;
        Ok(())
    }
}

/// Origin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    /// Base URL that paths are resolved against.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Total request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl OriginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Generate a default relay.toml config file.
pub fn generate_default_config(base_url: &str) -> String {
    format!(
        r##"# Relay worker configuration

[origin]
base_url = "{base_url}"
timeout_ms = 30000

[worker]
entries_prefix = "/entries/"
resources_prefix = "/resources/"
static_store = "static"
resources_store = "resources"
shell_assets = ["/main.js"]
shell_routes = ["/main.js", "/index.html"]
body_read_timeout_ms = 5000
style_import_timeout_ms = 10000
module_load_timeout_ms = 10000
carrier_selector = "#import-sheet"
"##
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_parses() {
        let config: CliConfig =
            toml::from_str(&generate_default_config("https://cdn.example.com")).unwrap();

        assert_eq!(config.origin.base_url, "https://cdn.example.com");
        assert_eq!(config.worker, WorkerConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CliConfig = toml::from_str(
            r#"
[worker]
body_read_timeout_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.origin.timeout_ms, 30_000);
        assert_eq!(config.worker.body_read_timeout(), Duration::from_millis(250));
        assert_eq!(config.worker.entries_prefix, "/entries/");
    }

    #[test]
    fn test_validate_rejects_bad_worker_section() {
        let mut config = CliConfig::default();
        config.worker.resources_store = config.worker.static_store.clone();
        assert!(config.validate().is_err());
    }
}
