//! # Embedding-Context Notifications
//!
//! Structured, fire-and-forget messages from a replay frame to the page
//! embedding it. The host decides how they travel (postMessage bridge,
//! event stream, log); the core only needs a [`NotifySink`].

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A notification for the embedding page. Serialized with a `wb_type` tag,
/// the shape the embedding page's message listener expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "wb_type")]
pub enum ReplayNotification {
    /// A framed resource was not in the archive.
    #[serde(rename = "archive-not-found")]
    ArchiveNotFound { url: String, ts: String },

    /// A top-level live-proxy page could not be loaded.
    #[serde(rename = "live-proxy-url-error")]
    LiveProxyUrlError { url: String, status: u16 },

    /// A live-proxy fetch failed.
    #[serde(rename = "live-proxy-error")]
    LiveProxyError {
        /// `"fetch"` for transport failures, `"status"` for non-success responses.
        #[serde(rename = "type")]
        kind: String,
        url: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
    },
}

/// Destination for [`ReplayNotification`]s. Implementations must never
/// block and never fail the caller.
pub trait NotifySink: Send + Sync {
    fn notify(&self, message: ReplayNotification);
}

/// Discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotifySink for NullSink {
    fn notify(&self, _message: ReplayNotification) {}
}

/// Logs notifications at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotifySink for TracingSink {
    fn notify(&self, message: ReplayNotification) {
        match serde_json::to_string(&message) {
            Ok(json) => tracing::info!(target: "replay::notify", "{json}"),
            Err(e) => tracing::debug!("unserializable notification: {e}"),
        }
    }
}

/// Fans notifications out to any number of subscribers.
///
/// Sending with no subscribers is not an error; the message is dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ReplayNotification>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReplayNotification> {
        self.tx.subscribe()
    }
}

impl NotifySink for BroadcastSink {
    fn notify(&self, message: ReplayNotification) {
        let _ = self.tx.send(message);
    }
}
