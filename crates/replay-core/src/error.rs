//! # Error Types
//!
//! The replay engine's failure taxonomy. Lookup and live-fetch failures are
//! recovered locally (downgraded to "absent"); only malformed requests and
//! registry mutations surface to the caller.

use thiserror::Error;

/// Top-level error type for the replay engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    /// Malformed request URL or timestamp. Rendered as a 400-class
    /// not-found variant, never propagated as a fatal error.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No exchange in any store.
    #[error("not found: {0}")]
    NotFound(String),

    /// Network/transport error or non-success status from a live fetch.
    #[error("live proxy failure fetching {url} (status {status:?})")]
    LiveProxyFailure {
        /// The archived URL that was being proxied.
        url: String,
        /// Upstream status, absent on transport failure.
        status: Option<u16>,
    },

    /// A collection with this name already exists.
    #[error("collection already exists: {0}")]
    DuplicateName(String),

    /// The collection-metadata store failed to read or write.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// The archived store collaborator failed.
    #[error("store error: {0}")]
    Store(String),
}

impl ReplayError {
    /// HTTP status used when this error is rendered as a synthesized page.
    pub fn status(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::LiveProxyFailure { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::DuplicateName(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
