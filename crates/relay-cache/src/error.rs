//! Cache error types.

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to open a named store.
    #[error("failed to open store {name:?}: {reason}")]
    Open { name: String, reason: String },

    /// Backend storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Failed to decode a manifest or attachment.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Manifest and attachment decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Manifest body was not a JSON object of attachment records.
    #[error("invalid manifest JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Attachment payload was not valid base64.
    #[error("invalid base64 payload for {url}: {source}")]
    Base64 {
        url: String,
        #[source]
        source: base64::DecodeError,
    },
}
