//! # replay-live — Live Proxy Store
//!
//! The [`LiveProxy`] is the [`ResourceStore`](replay_core::ResourceStore)
//! variant that answers lookups by fetching the live web. A collection uses
//! it either as its primary store (live collections) or as the fallback
//! tier consulted when the archived store has no capture.
//!
//! ## Failure handling
//!
//! A transport error or a status of 400 or above yields
//! `ReplayError::LiveProxyFailure`; the caller downgrades it to "absent".
//! When `message_on_proxy_errors` is set, exactly one
//! `live-proxy-error` notification is sent per failed fetch. Timeouts are
//! enforced by the HTTP client and handled like any other transport error.

pub mod config;
pub mod proxy;

pub use config::{HostProxyEntry, LiveProxyConfig};
pub use proxy::LiveProxy;
