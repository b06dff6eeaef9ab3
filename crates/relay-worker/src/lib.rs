//! Request interception for the relay resource worker.
//!
//! This crate provides:
//! - `EntryService` - Resolves entry requests through the resources store
//! - `Router` - Dispatches intercepted requests
//! - `LifecycleController` - Install/activate/sync/message handling
//! - `Worker` - Wires the pieces around one cache storage and origin
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use relay_fetch::{HttpFetcher, TimeoutConfig};
//! use relay_worker::{Intercept, Worker};
//!
//! let fetcher = HttpFetcher::new("https://cdn.example.com", TimeoutConfig::default())?;
//! let worker = Worker::builder(Arc::new(fetcher)).build()?;
//!
//! worker.handle_event(LifecycleEvent::Install).await?;
//! if let Intercept::Respond(response) = worker.handle_fetch("/entries/bar.js").await {
//!     assert_eq!(response.status(), 200);
//! }
//! ```

mod entry;
mod lifecycle;
mod router;
mod worker;

pub use entry::*;
pub use lifecycle::*;
pub use router::*;
pub use worker::*;
