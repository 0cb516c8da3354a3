//! # replay-core — Foundational Types for the Replay Engine
//!
//! Every other crate in the workspace depends on `replay-core`; it depends on
//! nothing internal.
//!
//! ## Contents
//!
//! - **`ArchiveRequest`** — an intercepted request parsed out of a replay
//!   path (`<timestamp><modifier>/<url>`), with the fetch destination the
//!   browser expects.
//! - **`Exchange`** — the result of a successful lookup: status, headers,
//!   body, tagged with the capture (or live fetch) timestamp.
//! - **`ResourceStore`** — the single capability every store variant
//!   implements (archived store adapter, live proxy).
//! - **`NotifySink`** — fire-and-forget notifications to the embedding page.
//! - **`notfound`** — content-type-negotiated not-found synthesis.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `replay-*` crates.
//! - No `panic!()` or `.unwrap()` outside tests.
//! - Failures inside lookups are values (`ReplayError`), never panics.

pub mod error;
pub mod exchange;
pub mod notfound;
pub mod notify;
pub mod request;
pub mod store;
pub mod temporal;

pub use error::ReplayError;
pub use exchange::{Exchange, ReplayResponse};
pub use notify::{BroadcastSink, NotifySink, NullSink, ReplayNotification, TracingSink};
pub use request::{ArchiveRequest, Destination, RequestMode};
pub use store::{PageRecord, ResourceStore};

/// Content-Security-Policy attached to every synthesized response.
///
/// Allows inline and same-origin script (the replay frame needs both) and
/// keeps form submissions inside the replay origin.
pub const REPLAY_CSP: &str = "default-src 'unsafe-eval' 'unsafe-inline' 'self' data: blob: mediastream: ws: wss: ; form-action 'self'";
