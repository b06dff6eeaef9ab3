//! Origin access for the relay resource worker.
//!
//! This crate provides:
//! - `Fetcher` - The network seam used by the worker
//! - `HttpFetcher` - reqwest-backed fetcher against an origin base URL
//! - `MemoryOrigin` - In-process origin for development and tests
//! - `TimeoutConfig` - Connect and total timeouts for origin requests

mod client;
mod memory;
mod timeout;

pub use client::*;
pub use memory::*;
pub use timeout::*;
