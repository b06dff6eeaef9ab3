//! Request context for intercepted requests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

impl RequestId {
    /// Generate a new request ID.
    ///
    /// Combines the wall clock with a process-wide sequence number, so two
    /// IDs generated in the same nanosecond still differ.
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{:x}-{:x}", nanos, seq))
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context for a single intercepted request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier.
    pub request_id: RequestId,
    /// Requested URL.
    pub url: String,
    start: Instant,
}

impl RequestContext {
    /// Create a new request context.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            request_id: RequestId::generate(),
            url: url.into(),
            start: Instant::now(),
        }
    }

    /// Time since the request was intercepted.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
