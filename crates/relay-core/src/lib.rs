//! Core abstractions for the relay resource worker.
//!
//! This crate provides the fundamental types shared by every relay crate:
//! - `WorkerConfig` - Namespaces, store names, shell assets and timeouts
//! - `RequestContext` / `RequestId` - Per-request correlation
//! - `LifecyclePhase` / `LifecycleEvent` - Worker lifecycle tracking

mod config;
mod context;
mod lifecycle;

pub use config::*;
pub use context::*;
pub use lifecycle::*;
