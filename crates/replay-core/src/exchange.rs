//! # Exchanges
//!
//! A stored or freshly fetched HTTP response, tagged with the timestamp of
//! its capture. An `Exchange` is owned by whoever received it from a store;
//! nothing at this layer caches or shares it.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// Response type produced by the replay pipeline.
pub type ReplayResponse = http::Response<Bytes>;

/// The result of a successful store lookup.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// URL the response was captured (or fetched) from.
    pub url: String,
    /// 14-digit capture timestamp.
    pub timestamp: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Fetched from the live web rather than an archive.
    pub is_live: bool,
    /// Retained copy of the body, present when the store was asked to
    /// duplicate responses for the caller.
    pub cloned_body: Option<Bytes>,
}

impl Exchange {
    pub fn new(url: impl Into<String>, timestamp: impl Into<String>, status: StatusCode) -> Self {
        Self {
            url: url.into(),
            timestamp: timestamp.into(),
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            is_live: false,
            cloned_body: None,
        }
    }

    pub fn with_body(mut self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        self.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static(content_type),
        );
        self.body = body.into();
        self
    }

    /// Bare MIME type of the body, lowercased, without parameters.
    pub fn mime_type(&self) -> Option<String> {
        let value = self.headers.get(http::header::CONTENT_TYPE)?.to_str().ok()?;
        let mime = value.split(';').next().unwrap_or("").trim();
        (!mime.is_empty()).then(|| mime.to_ascii_lowercase())
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// Consume the exchange into a response. `Content-Length` always matches
    /// the body.
    pub fn into_response(self) -> ReplayResponse {
        let mut headers = self.headers;
        headers.insert(http::header::CONTENT_LENGTH, http::HeaderValue::from(self.body.len()));
        let mut response = http::Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}
