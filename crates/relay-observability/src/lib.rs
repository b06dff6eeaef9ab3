//! Observability infrastructure for the relay resource worker.
//!
//! This crate provides:
//! - `init_logging` - tracing subscriber setup in human or JSON format
//! - `WorkerMetrics` - Counters for cache, origin and lifecycle activity

mod logging;
mod metrics;

pub use logging::*;
pub use metrics::*;
