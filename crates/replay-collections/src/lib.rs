//! # replay-collections — Collections and the Collection Registry
//!
//! A **collection** is one archived website capture plus its replay policy.
//! This crate owns the request-resolution pipeline for a single collection
//! and the registry that tracks every collection by name.
//!
//! ## Pipeline (`Collection::handle_request`)
//!
//! 1. Canonical redirect — non-canonical request URLs get a 301.
//! 2. Synthetic routes — wrapped module declaration, `srcdoc:` and `blob:`.
//! 3. Top frame — requests without a modifier get the enclosing frame page.
//! 4. Replay — archived store, then the live proxy fallback, then header
//!    policy and content rewriting.
//! 5. Not found — destination-negotiated synthesized response.
//!
//! ## Registry (`CollectionRegistry`)
//!
//! `uninitialized → initializing → ready`. The first `load_all` reads every
//! persisted record exactly once; concurrent callers await the same load.
//! Mutations persist first and touch the in-memory map only after the write
//! succeeds.
//!
//! ## External collaborators
//!
//! - [`ArchiveIndex`] — the archived store (key/timestamp → exchange).
//! - [`CollectionDb`] — persisted collection records.
//! - [`ContentRewriter`] — the body rewriting engine.

pub mod archive;
pub mod collection;
pub mod config;
pub mod db;
pub mod frame;
pub mod headers;
pub mod metadata;
pub mod registry;
pub mod rewrite;

pub use archive::{ArchiveIndex, ArchivedStore, MemoryArchive, MemoryStoreFactory, StoreFactory};
pub use collection::{Collection, CollectionParts};
pub use config::{CollConfig, Prefixes};
pub use db::{CollectionDb, DbError, MemoryCollectionDb};
pub use metadata::{CollMetadata, CollectionRecord, LoadProgress, NewCollection, ProgressFn};
pub use registry::{CollectionRegistry, RegistryState};
pub use rewrite::{ContentRewriter, HeadInsertRewriter, RewriteContext};
