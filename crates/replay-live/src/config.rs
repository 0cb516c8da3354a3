//! Live proxy configuration, deserialized from a collection's config.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Default per-request timeout for live fetches.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Alternate proxy target for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostProxyEntry {
    /// Prepended to the fetched URL (or path).
    pub prefix: String,
    /// Forward only path and query, not the full URL.
    pub path_only: bool,
    /// Drop the client's request headers for this host.
    pub no_headers: bool,
}

/// How a [`LiveProxy`](crate::LiveProxy) resolves and fetches URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveProxyConfig {
    /// Prepended to every fetch URL that is not host-mapped. Empty means
    /// fetch the URL directly.
    pub prefix: String,
    /// Replay prefix of the owning collection, used to turn archived
    /// referrers back into live ones.
    pub archive_prefix: String,
    /// Forward only path and query through `prefix`.
    pub proxy_path_only: bool,
    /// Host (`host[:port]`) to alternate proxy target.
    pub host_proxy: BTreeMap<String, HostProxyEntry>,
    /// Refuse hosts with no `host_proxy` entry.
    pub host_proxy_only: bool,
    /// Retain a copy of each fetched body on the exchange.
    pub clone_response: bool,
    /// Forward request bodies of non-GET requests.
    pub allow_body: bool,
    /// Notify the embedding page when a fetch fails.
    pub message_on_proxy_errors: bool,
    pub timeout_secs: u64,
}

impl Default for LiveProxyConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            archive_prefix: String::new(),
            proxy_path_only: false,
            host_proxy: BTreeMap::new(),
            host_proxy_only: false,
            clone_response: false,
            allow_body: false,
            message_on_proxy_errors: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}
