//! Cached responses and response construction.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use http::{HeaderMap, HeaderValue, Response, StatusCode};

/// Response type produced by the worker.
pub type HttpResponse = Response<Vec<u8>>;

/// A response held in a store.
///
/// The body is kept whole, so a reader either sees the complete body of a
/// write or none of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    body: Vec<u8>,
    content_type: HeaderValue,
    etag: Option<HeaderValue>,
}

impl CachedResponse {
    /// Create a new cached response.
    pub fn new(body: Vec<u8>, content_type: HeaderValue) -> Self {
        Self {
            body,
            content_type,
            etag: None,
        }
    }

    /// Attach an ETag.
    pub fn with_etag(mut self, etag: HeaderValue) -> Self {
        self.etag = Some(etag);
        self
    }

    /// Build from a head and a body read separately.
    pub fn from_parts(head: ResponseHead, body: Vec<u8>) -> Self {
        Self {
            body,
            content_type: head.content_type,
            etag: head.etag,
        }
    }

    /// Response body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Content type header value.
    pub fn content_type(&self) -> &HeaderValue {
        &self.content_type
    }

    /// Body length in bytes.
    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// ETag, if one was propagated from the manifest.
    pub fn etag(&self) -> Option<&HeaderValue> {
        self.etag.as_ref()
    }

    /// Metadata of this response without the body.
    pub fn head(&self) -> ResponseHead {
        ResponseHead {
            content_type: self.content_type.clone(),
            content_length: self.body.len(),
            etag: self.etag.clone(),
        }
    }

    /// Convert into an HTTP response including the ETag.
    pub fn into_http(self) -> HttpResponse {
        build_response(self.body, &self.content_type, self.etag.as_ref())
    }
}

/// Response metadata, available without reading the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Content type header value.
    pub content_type: HeaderValue,
    /// Body length in bytes.
    pub content_length: usize,
    /// ETag, if any.
    pub etag: Option<HeaderValue>,
}

/// Build a 200 response with `Content-Length`, `Content-Type` and an
/// optional `ETag`.
pub fn build_response(
    body: Vec<u8>,
    content_type: &HeaderValue,
    etag: Option<&HeaderValue>,
) -> HttpResponse {
    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    headers.insert(CONTENT_TYPE, content_type.clone());
    if let Some(etag) = etag {
        headers.insert(ETAG, etag.clone());
    }

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    *response.headers_mut() = headers;
    response
}

/// Build an empty response with the given status.
pub fn status_response(status: StatusCode) -> HttpResponse {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = status;
    response
}
