//! Client-side resource loading for relay.
//!
//! This crate provides:
//! - `StyleImporter` - Deduplicated stylesheet injection through a carrier sheet
//! - `ModuleLoader` - Bounded module loading that pulls in declared stylesheets
//! - Host traits (`StyleDocument`, `ImportSheet`, `StyleSheet`) and an
//!   in-memory implementation for hosts without a document

mod host;
mod importer;
mod loader;

pub use host::*;
pub use importer::*;
pub use loader::*;
