//! Caching infrastructure for the relay resource worker.
//!
//! This crate provides:
//! - `AttachmentRecord` / `decode_attachment` - Manifest attachment decoding
//! - `Manifest` - A fetched bundle of attachments plus its ETag
//! - `CachedResponse` - A stored response with its headers
//! - `ResponseStore` / `CacheStorage` - Named response stores
//! - `LoadCoalescer` - At most one in-flight load per key
//!
//! # Example
//!
//! ```ignore
//! use relay_cache::{CacheStorage, Manifest};
//!
//! let storage = CacheStorage::in_memory();
//! let resources = storage.open("resources")?;
//!
//! let manifest = Manifest::from_json(&body, etag)?;
//! for (url, response) in manifest.decode_all()? {
//!     resources.put(&url, response).await?;
//! }
//! ```

mod attachment;
mod coalesce;
mod error;
mod manifest;
mod response;
mod store;

pub use attachment::*;
pub use coalesce::*;
pub use error::*;
pub use manifest::*;
pub use response::*;
pub use store::*;
