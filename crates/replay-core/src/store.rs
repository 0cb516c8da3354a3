//! # Resource Store Capability
//!
//! Every source of exchanges — the archived-store adapter and the live
//! proxy — implements [`ResourceStore`]. A `Collection` holds one as a
//! trait object and never needs to know which variant it has.

use async_trait::async_trait;
use http::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::error::ReplayError;
use crate::exchange::Exchange;
use crate::request::ArchiveRequest;

/// One captured URL, as listed by a store's index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub url: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Uniform lookup contract over archived and live sources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Resolve `request` to an exchange. `Ok(None)` means the store has no
    /// match; `Err` means the store failed while looking.
    async fn lookup(
        &self,
        request: &ArchiveRequest,
        prefix: &str,
    ) -> Result<Option<Exchange>, ReplayError>;

    /// Every captured URL this store can enumerate.
    async fn list_all(&self) -> Result<Vec<PageRecord>, ReplayError>;

    /// Whether lookups hit the live web.
    fn is_live(&self) -> bool {
        false
    }

    /// Replace the extra headers the store sends upstream (auth).
    fn update_headers(&self, _headers: &HeaderMap) {}

    /// Release the store's resources. Called once, when the owning
    /// collection is dropped from the registry.
    async fn close(&self) {}
}
