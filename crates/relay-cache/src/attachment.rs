//! Attachment decoding.

use base64::{engine::general_purpose::STANDARD, Engine};
use http::HeaderValue;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::response::CachedResponse;

/// Content type used for attachments without a more specific one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/javascript";

/// Content type forced for `.css` sub-resources.
pub const CSS_CONTENT_TYPE: &str = "text/css";

/// One sub-resource as transmitted inside a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRecord {
    /// Base64-encoded payload.
    pub data: String,
    /// Content type declared by the producer. Serving derives the type from
    /// the URL instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl AttachmentRecord {
    /// Create a record from an already-encoded payload.
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            content_type: None,
        }
    }

    /// Create a record by encoding raw bytes.
    pub fn encode(bytes: impl AsRef<[u8]>) -> Self {
        Self::new(STANDARD.encode(bytes))
    }

    /// Set an explicit content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A decoded attachment ready to be cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    /// Raw payload bytes.
    pub body: Vec<u8>,
    /// Resolved content type.
    pub content_type: HeaderValue,
}

impl DecodedAttachment {
    /// Turn into a cacheable response, tagging it with the manifest's ETag.
    pub fn into_cached(self, etag: Option<HeaderValue>) -> CachedResponse {
        let response = CachedResponse::new(self.body, self.content_type);
        match etag {
            Some(etag) => response.with_etag(etag),
            None => response,
        }
    }
}

/// Resolve the content type for a sub-resource from its URL alone.
///
/// `.css` URLs are `text/css`; everything else is served as JavaScript.
pub fn resolve_content_type(url: &str) -> &'static str {
    if url.ends_with(".css") {
        CSS_CONTENT_TYPE
    } else {
        DEFAULT_CONTENT_TYPE
    }
}

/// Decode an attachment record for the given sub-resource URL.
pub fn decode_attachment(
    url: &str,
    record: &AttachmentRecord,
) -> Result<DecodedAttachment, DecodeError> {
    let body = STANDARD
        .decode(record.data.trim())
        .map_err(|source| DecodeError::Base64 {
            url: url.to_string(),
            source,
        })?;

    let content_type = HeaderValue::from_static(resolve_content_type(url));

    Ok(DecodedAttachment { body, content_type })
}
