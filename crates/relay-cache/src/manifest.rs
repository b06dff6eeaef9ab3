//! Manifests: bundles of attachments fetched from the origin.

use std::collections::BTreeMap;

use http::HeaderValue;

use crate::attachment::{decode_attachment, AttachmentRecord};
use crate::error::DecodeError;
use crate::response::CachedResponse;

/// A decoded manifest body plus the ETag of its transport response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    /// Sub-resource URL to attachment.
    pub entries: BTreeMap<String, AttachmentRecord>,
    /// Validation tag of the manifest response.
    pub etag: Option<String>,
}

impl Manifest {
    /// Parse a manifest from its JSON body.
    pub fn from_json(body: &[u8], etag: Option<String>) -> Result<Self, DecodeError> {
        let entries = serde_json::from_slice(body)?;
        Ok(Self { entries, etag })
    }

    /// Number of sub-resources in the manifest.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no sub-resources.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the manifest carries the given sub-resource.
    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    /// Decode every attachment into a cacheable response.
    ///
    /// All-or-nothing: the first malformed record fails the whole manifest,
    /// so nothing is written for a manifest that cannot be fully decoded.
    pub fn decode_all(&self) -> Result<Vec<(String, CachedResponse)>, DecodeError> {
        // An ETag that is not a valid header value is dropped, not fatal.
        let etag = self
            .etag
            .as_deref()
            .and_then(|etag| HeaderValue::from_str(etag).ok());

        self.entries
            .iter()
            .map(|(url, record)| {
                let decoded = decode_attachment(url, record)?;
                Ok((url.clone(), decoded.into_cached(etag.clone())))
            })
            .collect()
    }
}
