//! # Archived-Store Adapter
//!
//! The archived store (indexing and retrieval of captured exchanges) is an
//! external collaborator reached through [`ArchiveIndex`]. [`ArchivedStore`]
//! adapts it to the [`ResourceStore`] capability so a `Collection` holds
//! either variant behind the same trait object.
//!
//! [`MemoryArchive`] is a reference index kept in memory. It resolves a
//! requested timestamp to the capture with the smallest absolute distance,
//! preferring the earlier capture on a tie.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use http::{HeaderMap, Method};
use parking_lot::{Mutex, RwLock};
use replay_core::temporal::{pad_timestamp, timestamp_to_datetime};
use replay_core::{ArchiveRequest, Exchange, PageRecord, ReplayError, ResourceStore};

use crate::metadata::{CollectionRecord, LoadProgress, ProgressFn};

/// External archived-store collaborator.
#[async_trait]
pub trait ArchiveIndex: Send + Sync {
    /// Best capture of `url` for `timestamp` (empty = latest).
    async fn lookup_url(
        &self,
        url: &str,
        timestamp: &str,
        method: &Method,
    ) -> Result<Option<Exchange>, ReplayError>;

    async fn list_urls(&self) -> Result<Vec<PageRecord>, ReplayError>;

    /// Auth headers for archives loaded from a remote source.
    fn set_headers(&self, _headers: &HeaderMap) {}

    async fn close(&self) {}
}

/// [`ResourceStore`] over an owned [`ArchiveIndex`].
pub struct ArchivedStore {
    index: Box<dyn ArchiveIndex>,
}

impl ArchivedStore {
    pub fn new(index: Box<dyn ArchiveIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl ResourceStore for ArchivedStore {
    async fn lookup(
        &self,
        request: &ArchiveRequest,
        _prefix: &str,
    ) -> Result<Option<Exchange>, ReplayError> {
        self.index
            .lookup_url(&request.url, &request.timestamp, &request.method)
            .await
    }

    async fn list_all(&self) -> Result<Vec<PageRecord>, ReplayError> {
        self.index.list_urls().await
    }

    fn update_headers(&self, headers: &HeaderMap) {
        self.index.set_headers(headers);
    }

    async fn close(&self) {
        self.index.close().await;
    }
}

/// In-memory [`ArchiveIndex`]: url → timestamp → exchange.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    captures: RwLock<BTreeMap<String, BTreeMap<String, Exchange>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_exchanges(exchanges: impl IntoIterator<Item = Exchange>) -> Self {
        let archive = Self::new();
        for exchange in exchanges {
            archive.add(exchange);
        }
        archive
    }

    /// Add a capture, replacing any capture of the same url and timestamp.
    pub fn add(&self, exchange: Exchange) {
        self.captures
            .write()
            .entry(exchange.url.clone())
            .or_default()
            .insert(exchange.timestamp.clone(), exchange);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

/// Pick the capture nearest to `requested`. Ties go to the earlier one.
fn nearest<'a>(captures: &'a BTreeMap<String, Exchange>, requested: &str) -> Option<&'a Exchange> {
    let target = pad_timestamp(requested).and_then(|ts| timestamp_to_datetime(&ts));
    let Some(target) = target else {
        return captures.values().next_back();
    };

    // BTreeMap iterates oldest first, so strict `<` keeps the earlier
    // capture on equal distance.
    let mut best: Option<(i64, &Exchange)> = None;
    for (ts, exchange) in captures {
        let Some(at) = timestamp_to_datetime(ts) else {
            continue;
        };
        let distance = (at - target).num_seconds().abs();
        if best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, exchange));
        }
    }
    best.map(|(_, exchange)| exchange)
}

#[async_trait]
impl ArchiveIndex for MemoryArchive {
    async fn lookup_url(
        &self,
        url: &str,
        timestamp: &str,
        method: &Method,
    ) -> Result<Option<Exchange>, ReplayError> {
        if method != Method::GET && method != Method::HEAD {
            return Ok(None);
        }
        let captures = self.captures.read();
        Ok(captures
            .get(url)
            .and_then(|by_ts| nearest(by_ts, timestamp))
            .cloned())
    }

    async fn list_urls(&self) -> Result<Vec<PageRecord>, ReplayError> {
        let captures = self.captures.read();
        Ok(captures
            .values()
            .flat_map(BTreeMap::values)
            .map(|ex| PageRecord {
                url: ex.url.clone(),
                timestamp: ex.timestamp.clone(),
                title: None,
                mime: ex.mime_type(),
                status: Some(ex.status.as_u16()),
            })
            .collect())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Opens and removes the archived store behind a collection record.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Open (importing if necessary) the store for `record`.
    async fn open(
        &self,
        record: &CollectionRecord,
        progress: ProgressFn<'_>,
    ) -> Result<Box<dyn ArchiveIndex>, ReplayError>;

    /// Remove the underlying storage. With `keep_file_handle` the source
    /// handle survives for a later re-import.
    async fn remove(&self, record: &CollectionRecord, keep_file_handle: bool)
        -> Result<(), ReplayError>;
}

/// [`StoreFactory`] handing out [`MemoryArchive`]s built from per-name seeds.
#[derive(Debug, Default)]
pub struct MemoryStoreFactory {
    seeds: DashMap<String, Vec<Exchange>>,
    opened: DashMap<String, Vec<Arc<AtomicBool>>>,
    removed: Mutex<Vec<(String, bool)>>,
}

impl MemoryStoreFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures every store opened for `name` starts with.
    pub fn seed(&self, name: &str, exchanges: Vec<Exchange>) {
        self.seeds.insert(name.to_string(), exchanges);
    }

    /// Whether every store opened for `name` so far has been closed.
    pub fn all_closed(&self, name: &str) -> bool {
        self.opened
            .get(name)
            .map_or(true, |flags| flags.iter().all(|f| f.load(Ordering::Acquire)))
    }

    /// `(name, keep_file_handle)` for every `remove` call, in order.
    pub fn removed(&self) -> Vec<(String, bool)> {
        self.removed.lock().clone()
    }
}

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn open(
        &self,
        record: &CollectionRecord,
        progress: ProgressFn<'_>,
    ) -> Result<Box<dyn ArchiveIndex>, ReplayError> {
        let seeds = self
            .seeds
            .get(&record.name)
            .map(|s| s.value().clone())
            .unwrap_or_default();

        let archive = MemoryArchive::new();
        let total = seeds.len().max(1);
        for (i, exchange) in seeds.into_iter().enumerate() {
            archive.add(exchange);
            let percent = ((i + 1) * 100 / total) as u8;
            progress(LoadProgress::Importing { percent });
        }

        self.opened
            .entry(record.name.clone())
            .or_default()
            .push(archive.closed_flag());
        Ok(Box::new(archive))
    }

    async fn remove(
        &self,
        record: &CollectionRecord,
        keep_file_handle: bool,
    ) -> Result<(), ReplayError> {
        if !keep_file_handle {
            self.seeds.remove(&record.name);
        }
        self.removed.lock().push((record.name.clone(), keep_file_handle));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn capture(url: &str, ts: &str, body: &'static str) -> Exchange {
        Exchange::new(url, ts, StatusCode::OK).with_body("text/html", body)
    }

    fn archive() -> MemoryArchive {
        MemoryArchive::from_exchanges([
            capture("http://example.com/", "20200101000000", "2020"),
            capture("http://example.com/", "20220101000000", "2022"),
            capture("http://example.com/", "20240101000000", "2024"),
        ])
    }

    async fn body_at(archive: &MemoryArchive, ts: &str) -> String {
        let ex = archive
            .lookup_url("http://example.com/", ts, &Method::GET)
            .await
            .unwrap()
            .unwrap();
        String::from_utf8(ex.body.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn nearest_capture_wins() {
        let a = archive();
        assert_eq!(body_at(&a, "20211201000000").await, "2022");
        assert_eq!(body_at(&a, "2019").await, "2020");
        assert_eq!(body_at(&a, "20991231235959").await, "2024");
    }

    #[tokio::test]
    async fn empty_timestamp_is_latest() {
        assert_eq!(body_at(&archive(), "").await, "2024");
    }

    #[tokio::test]
    async fn tie_prefers_earlier_capture() {
        let a = MemoryArchive::from_exchanges([
            capture("http://example.com/", "20200101000000", "early"),
            capture("http://example.com/", "20200101000010", "late"),
        ]);
        assert_eq!(body_at(&a, "20200101000005").await, "early");
    }

    #[tokio::test]
    async fn post_never_matches_stored_get() {
        let a = archive();
        let res = a
            .lookup_url("http://example.com/", "", &Method::POST)
            .await
            .unwrap();
        assert!(res.is_none());
    }

    #[tokio::test]
    async fn factory_stores_are_independent_and_closable() {
        let factory = MemoryStoreFactory::new();
        factory.seed("a", vec![capture("http://a.test/", "20200101000000", "a")]);
        let record = CollectionRecord {
            name: "a".into(),
            coll_type: "archive".into(),
            config: serde_json::Value::Null,
            metadata: Default::default(),
        };
        let events = Mutex::new(Vec::new());
        let first = factory.open(&record, &|p| events.lock().push(p)).await.unwrap();
        let second = factory.open(&record, &|_| {}).await.unwrap();
        assert_eq!(
            events.lock().as_slice(),
            &[LoadProgress::Importing { percent: 100 }]
        );

        first.close().await;
        assert!(!factory.all_closed("a"));
        second.close().await;
        assert!(factory.all_closed("a"));
        assert_eq!(second.list_urls().await.unwrap().len(), 1);
    }
}
