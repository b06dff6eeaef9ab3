//! Worker lifecycle tracking.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle phases of a worker generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// Install transition running.
    Installing,
    /// Installed, waiting for activation.
    Installed,
    /// Controlling clients.
    Active,
    /// Replaced by a newer generation.
    Superseded,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Active => write!(f, "active"),
            Self::Superseded => write!(f, "superseded"),
        }
    }
}

/// Platform-delivered lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// A new worker generation is being installed.
    Install,
    /// The installed generation is taking over.
    Activate,
    /// Background reconciliation with the given tag.
    Sync(String),
    /// Explicit control message from a client.
    Message(serde_json::Value),
    /// A newer generation has replaced this one.
    Supersede,
}

impl LifecycleEvent {
    /// Short event name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Activate => "activate",
            Self::Sync(_) => "sync",
            Self::Message(_) => "message",
            Self::Supersede => "supersede",
        }
    }

    /// Whether handling this event wipes the resources store.
    pub fn resets_resources(&self) -> bool {
        matches!(self, Self::Install | Self::Sync(_) | Self::Message(_))
    }
}

/// Observer trait for lifecycle transitions.
pub trait LifecycleObserver: Send + Sync {
    /// Called after an event has been handled.
    fn on_transition(&self, event: &LifecycleEvent, phase: LifecyclePhase, elapsed: Duration);
}
