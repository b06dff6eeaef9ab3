//! Worker-level counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use relay_core::{LifecycleEvent, LifecycleObserver, LifecyclePhase};
use serde::{Deserialize, Serialize};

/// Counters shared by every component of a worker.
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    manifest_fetches: AtomicU64,
    coalesced_joins: AtomicU64,
    load_failures: AtomicU64,
    not_found: AtomicU64,
    read_timeouts: AtomicU64,
    static_hits: AtomicU64,
    static_fallbacks: AtomicU64,
    lifecycle_events: AtomicU64,
    resource_resets: AtomicU64,
    phase: Mutex<Option<LifecyclePhase>>,
}

impl WorkerMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// An entry was answered from the resources store without loading.
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// An entry was not in the resources store on first lookup.
    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// A manifest fetch was started.
    pub fn record_manifest_fetch(&self) {
        self.manifest_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// A request waited on a load started by another request.
    pub fn record_coalesced_join(&self) {
        self.coalesced_joins.fetch_add(1, Ordering::Relaxed);
    }

    /// A manifest load failed.
    pub fn record_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// An entry request was answered 404.
    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// An entry body read-back timed out and was answered 500.
    pub fn record_read_timeout(&self) {
        self.read_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// A shell asset was answered from the static store.
    pub fn record_static_hit(&self) {
        self.static_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// A shell asset fell back to the network.
    pub fn record_static_fallback(&self) {
        self.static_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            captured_at: Utc::now(),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            manifest_fetches: self.manifest_fetches.load(Ordering::Relaxed),
            coalesced_joins: self.coalesced_joins.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            static_hits: self.static_hits.load(Ordering::Relaxed),
            static_fallbacks: self.static_fallbacks.load(Ordering::Relaxed),
            lifecycle_events: self.lifecycle_events.load(Ordering::Relaxed),
            resource_resets: self.resource_resets.load(Ordering::Relaxed),
            phase: *self.phase.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }
}

impl LifecycleObserver for WorkerMetrics {
    fn on_transition(&self, event: &LifecycleEvent, phase: LifecyclePhase, _elapsed: Duration) {
        self.lifecycle_events.fetch_add(1, Ordering::Relaxed);
        if event.resets_resources() {
            self.resource_resets.fetch_add(1, Ordering::Relaxed);
        }
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = Some(phase);
    }
}

/// Point-in-time copy of `WorkerMetrics`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub manifest_fetches: u64,
    pub coalesced_joins: u64,
    pub load_failures: u64,
    pub not_found: u64,
    pub read_timeouts: u64,
    pub static_hits: u64,
    pub static_fallbacks: u64,
    pub lifecycle_events: u64,
    pub resource_resets: u64,
    /// Last lifecycle phase reached.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<LifecyclePhase>,
}

impl MetricsSnapshot {
    /// Format as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Format as JSON (pretty printed).
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Format as human-readable summary.
    pub fn to_summary(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Metrics at {}", self.captured_at.to_rfc3339()));
        lines.push(format!(
            "  Entries: {} hit / {} miss / {} not found / {} read timeout",
            self.cache_hits, self.cache_misses, self.not_found, self.read_timeouts
        ));
        lines.push(format!(
            "  Manifests: {} fetched / {} coalesced / {} failed",
            self.manifest_fetches, self.coalesced_joins, self.load_failures
        ));
        lines.push(format!(
            "  Shell: {} from cache / {} from network",
            self.static_hits, self.static_fallbacks
        ));

        if let Some(phase) = self.phase {
            lines.push(format!(
                "  Lifecycle: {} ({} events, {} resets)",
                phase, self.lifecycle_events, self.resource_resets
            ));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = WorkerMetrics::new();
        metrics.record_cache_hit();
        metrics.record_cache_hit();
        metrics.record_manifest_fetch();
        metrics.record_coalesced_join();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache_hits, 2);
        assert_eq!(snapshot.manifest_fetches, 1);
        assert_eq!(snapshot.coalesced_joins, 1);
        assert_eq!(snapshot.phase, None);
    }

    #[test]
    fn test_lifecycle_observer_counts_resets() {
        let metrics = WorkerMetrics::new();
        metrics.on_transition(&LifecycleEvent::Install, LifecyclePhase::Installed, Duration::ZERO);
        metrics.on_transition(&LifecycleEvent::Activate, LifecyclePhase::Active, Duration::ZERO);
        metrics.on_transition(
            &LifecycleEvent::Sync("sync".to_string()),
            LifecyclePhase::Active,
            Duration::ZERO,
        );

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lifecycle_events, 3);
        assert_eq!(snapshot.resource_resets, 2);
        assert_eq!(snapshot.phase, Some(LifecyclePhase::Active));
    }

    #[test]
    fn test_summary_mentions_phase() {
        let metrics = WorkerMetrics::new();
        metrics.on_transition(&LifecycleEvent::Activate, LifecyclePhase::Active, Duration::ZERO);

        let summary = metrics.snapshot().to_summary();
        assert!(summary.contains("Lifecycle: active"));
        assert!(metrics.snapshot().to_json().contains("\"phase\":\"active\""));
    }
}
