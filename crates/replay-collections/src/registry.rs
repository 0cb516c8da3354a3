//! # Collection Registry
//!
//! Tracks every collection by name and keeps the in-memory map consistent
//! with the persisted collection records.
//!
//! ## Initialization
//!
//! `uninitialized → initializing → ready`. The first [`load_all`] reads
//! every record once behind a `tokio::sync::OnceCell`; callers arriving
//! while that load runs await the same cell and observe the same map. A
//! failed load leaves the cell empty so the next caller retries.
//!
//! ## Mutations
//!
//! Every mutation writes the persisted record first and touches the
//! in-memory collection only after the write succeeded. Concurrent
//! metadata or size updates to one collection are last-write-wins.
//!
//! No lock guard is held across an `.await`.
//!
//! [`load_all`]: CollectionRegistry::load_all

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use replay_core::{NotifySink, ReplayError, ResourceStore, TracingSink};
use replay_live::LiveProxy;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::archive::{ArchivedStore, StoreFactory};
use crate::collection::{prefix_for, Collection, CollectionParts};
use crate::config::{CollConfig, Prefixes};
use crate::db::CollectionDb;
use crate::metadata::{CollMetadata, CollectionRecord, LoadProgress, NewCollection, ProgressFn};
use crate::rewrite::{ContentRewriter, HeadInsertRewriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Marks a load in progress; lowered on drop, so a cancelled load does not
/// leave the registry reporting `Initializing`.
struct LoadingFlag<'a>(&'a AtomicBool);

impl<'a> LoadingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for LoadingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// All collections known to one replay engine.
pub struct CollectionRegistry {
    db: Arc<dyn CollectionDb>,
    factory: Arc<dyn StoreFactory>,
    rewriter: Arc<dyn ContentRewriter>,
    notify: Arc<dyn NotifySink>,
    prefixes: Prefixes,
    root: Option<String>,
    default_config: Value,
    colls: RwLock<HashMap<String, Arc<Collection>>>,
    init: OnceCell<()>,
    initializing: AtomicBool,
}

impl CollectionRegistry {
    pub fn new(db: Arc<dyn CollectionDb>, factory: Arc<dyn StoreFactory>, prefixes: Prefixes) -> Self {
        Self {
            db,
            factory,
            rewriter: Arc::new(HeadInsertRewriter),
            notify: Arc::new(TracingSink),
            prefixes,
            root: None,
            default_config: Value::Object(Default::default()),
            colls: RwLock::new(HashMap::new()),
            init: OnceCell::new(),
            initializing: AtomicBool::new(false),
        }
    }

    /// Serve collection `root` at the root prefix.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Config every collection record is merged over.
    pub fn with_default_config(mut self, default_config: Value) -> Self {
        self.default_config = default_config;
        self
    }

    pub fn with_rewriter(mut self, rewriter: Arc<dyn ContentRewriter>) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Sink for live-proxy error notifications.
    pub fn with_notify(mut self, notify: Arc<dyn NotifySink>) -> Self {
        self.notify = notify;
        self
    }

    pub fn prefixes(&self) -> &Prefixes {
        &self.prefixes
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn state(&self) -> RegistryState {
        if self.init.initialized() {
            RegistryState::Ready
        } else if self.initializing.load(Ordering::Acquire) {
            RegistryState::Initializing
        } else {
            RegistryState::Uninitialized
        }
    }

    /// Load every persisted collection. Runs at most once; concurrent
    /// callers await the same load.
    pub async fn load_all(&self) -> Result<(), ReplayError> {
        self.init
            .get_or_try_init(|| async {
                let _loading = LoadingFlag::raise(&self.initializing);
                self.load_records().await
            })
            .await
            .map(|_| ())
    }

    /// Rebuild every collection from its persisted record, even when
    /// already loaded.
    pub async fn reload_all(&self) -> Result<(), ReplayError> {
        if !self.init.initialized() {
            return self.load_all().await;
        }
        self.load_records().await
    }

    async fn load_records(&self) -> Result<(), ReplayError> {
        let records = self.db.list().await?;
        let mut loaded = HashMap::with_capacity(records.len());
        for record in records {
            let name = record.name.clone();
            match self.create_collection(record, &|_| {}).await {
                Ok(coll) => {
                    loaded.insert(name, Arc::new(coll));
                }
                Err(e) => warn!(coll = %name, error = %e, "skipping collection that failed to load"),
            }
        }
        info!(count = loaded.len(), "collections loaded");

        let previous = std::mem::replace(&mut *self.colls.write(), loaded);
        for (_, coll) in previous {
            coll.close().await;
        }
        Ok(())
    }

    /// Build a collection (and open its store) from a record.
    async fn create_collection(
        &self,
        record: CollectionRecord,
        progress: ProgressFn<'_>,
    ) -> Result<Collection, ReplayError> {
        let config = CollConfig::from_values(&self.default_config, &record.config)?;
        let is_root = self.root.as_deref() == Some(record.name.as_str());
        let prefix = prefix_for(&self.prefixes, &record.name, is_root);

        let (store, live_fallback): (Box<dyn ResourceStore>, Option<LiveProxy>) = if record.is_live() {
            (Box::new(self.live_proxy(&config, &prefix)?), None)
        } else {
            let index = self.factory.open(&record, progress).await?;
            let fallback = if config.live_redirect_on_not_found {
                Some(self.live_proxy(&config, &prefix)?)
            } else {
                None
            };
            (Box::new(ArchivedStore::new(index)), fallback)
        };

        Ok(Collection::new(
            CollectionParts {
                record,
                config,
                store,
                live_fallback,
                rewriter: self.rewriter.clone(),
                is_root,
            },
            &self.prefixes,
        ))
    }

    fn live_proxy(&self, config: &CollConfig, prefix: &str) -> Result<LiveProxy, ReplayError> {
        let mut live = config.live_proxy.clone();
        if live.archive_prefix.is_empty() {
            live.archive_prefix = prefix.to_string();
        }
        let client = LiveProxy::build_client(live.timeout_secs)?;
        Ok(LiveProxy::new(live, client, self.notify.clone()))
    }

    /// Collection `name`, loading the registry first if needed. A record
    /// persisted after the initial load is picked up on demand.
    pub async fn get_coll(&self, name: &str) -> Option<Arc<Collection>> {
        if let Err(e) = self.load_all().await {
            warn!(error = %e, "collection load failed");
            return None;
        }
        let existing = self.colls.read().get(name).cloned();
        if existing.is_some() {
            return existing;
        }

        let record = match self.db.get(name).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(coll = %name, error = %e, "collection lookup failed");
                return None;
            }
        };
        match self.create_collection(record, &|_| {}).await {
            Ok(coll) => Some(self.insert_or_existing(Arc::new(coll)).await),
            Err(e) => {
                warn!(coll = %name, error = %e, "collection failed to load");
                None
            }
        }
    }

    /// Register `coll` unless another task registered the name first, in
    /// which case `coll` is closed and the winner returned.
    async fn insert_or_existing(&self, coll: Arc<Collection>) -> Arc<Collection> {
        let winner = match self.colls.write().entry(coll.name().to_string()) {
            Entry::Occupied(slot) => Some(slot.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(coll.clone());
                None
            }
        };
        match winner {
            Some(existing) => {
                coll.close().await;
                existing
            }
            None => coll,
        }
    }

    /// Replace collection `name` with a fresh instance built from its
    /// persisted record. Returns `false` if no such record exists.
    pub async fn reload(&self, name: &str) -> Result<bool, ReplayError> {
        self.load_all().await?;
        let Some(record) = self.db.get(name).await? else {
            let removed = self.colls.write().remove(name);
            if let Some(coll) = removed {
                coll.close().await;
            }
            return Ok(false);
        };
        let coll = Arc::new(self.create_collection(record, &|_| {}).await?);
        let previous = self.colls.write().insert(name.to_string(), coll);
        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok(true)
    }

    /// Persist and register a new collection, opening (importing) its
    /// store. Fails with [`ReplayError::DuplicateName`] if the name exists.
    pub async fn add_collection(
        &self,
        data: NewCollection,
        progress: ProgressFn<'_>,
    ) -> Result<Arc<Collection>, ReplayError> {
        self.load_all().await?;
        progress(LoadProgress::Validating);
        validate_name(&data.name)?;
        if self.colls.read().contains_key(&data.name) {
            return Err(ReplayError::DuplicateName(data.name));
        }

        let record = data.into_record(Utc::now().timestamp_millis());
        progress(LoadProgress::Persisting);
        self.db.insert(&record).await?;

        let coll = match self.create_collection(record.clone(), progress).await {
            Ok(coll) => Arc::new(coll),
            Err(e) => {
                if let Err(rollback) = self.db.delete(&record.name).await {
                    warn!(coll = %record.name, error = %rollback, "rollback of failed add left a stale record");
                }
                return Err(e);
            }
        };
        let coll = self.insert_or_existing(coll).await;
        info!(coll = %record.name, "collection added");
        progress(LoadProgress::Done);
        Ok(coll)
    }

    /// Remove a collection from the persisted store and the registry.
    /// Returns `false` for an unknown name.
    pub async fn delete_coll(&self, name: &str, keep_file_handle: bool) -> Result<bool, ReplayError> {
        self.load_all().await?;
        let in_memory = self.colls.read().get(name).map(|c| c.record());
        let record = match in_memory {
            Some(record) => record,
            None => match self.db.get(name).await? {
                Some(record) => record,
                None => return Ok(false),
            },
        };

        self.db.delete(name).await?;
        let removed = self.colls.write().remove(name);
        if let Some(coll) = removed {
            coll.close().await;
        }
        if let Err(e) = self.factory.remove(&record, keep_file_handle).await {
            warn!(coll = %name, error = %e, "store removal failed");
        }
        info!(coll = %name, keep_file_handle, "collection deleted");
        Ok(true)
    }

    /// Replace the auth headers the collection's store sends upstream.
    pub async fn update_auth(
        &self,
        name: &str,
        headers: BTreeMap<String, String>,
    ) -> Result<bool, ReplayError> {
        let Some(coll) = self.get_coll(name).await else {
            return Ok(false);
        };
        let mut record = self.current_record(&coll).await?;
        let mut raw = match record.config {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        raw.insert("headers".into(), serde_json::to_value(&headers).unwrap_or_default());
        record.config = Value::Object(raw);
        let config = CollConfig::from_values(&self.default_config, &record.config)?;

        self.db.put(&record).await?;
        coll.set_config(record.config, config);
        Ok(true)
    }

    /// Patch metadata fields. `Ok(None)` for an unknown name.
    pub async fn update_metadata(
        &self,
        name: &str,
        patch: &Value,
    ) -> Result<Option<CollMetadata>, ReplayError> {
        self.update_record_metadata(name, |metadata| {
            metadata
                .merged(patch)
                .map_err(|e| ReplayError::InvalidRequest(format!("metadata: {e}")))
        })
        .await
    }

    /// Set the size counters; `update_decode` also sets the decode flag.
    pub async fn update_size(
        &self,
        name: &str,
        full_size: u64,
        dedup_size: u64,
        update_decode: Option<bool>,
    ) -> Result<Option<CollMetadata>, ReplayError> {
        self.update_record_metadata(name, |metadata| {
            let mut metadata = metadata.clone();
            metadata.full_size = full_size;
            metadata.dedup_size = dedup_size;
            if let Some(decode) = update_decode {
                metadata.decode = decode;
            }
            Ok(metadata)
        })
        .await
    }

    async fn update_record_metadata(
        &self,
        name: &str,
        apply: impl FnOnce(&CollMetadata) -> Result<CollMetadata, ReplayError>,
    ) -> Result<Option<CollMetadata>, ReplayError> {
        let Some(coll) = self.get_coll(name).await else {
            return Ok(None);
        };
        let mut record = self.current_record(&coll).await?;
        let mut metadata = apply(&record.metadata)?;
        metadata.mtime = Utc::now().timestamp_millis();
        record.metadata = metadata.clone();

        self.db.put(&record).await?;
        coll.set_metadata(metadata.clone());
        Ok(Some(metadata))
    }

    /// Persisted record of `coll`, falling back to its in-memory form if the
    /// record vanished underneath us.
    async fn current_record(&self, coll: &Collection) -> Result<CollectionRecord, ReplayError> {
        Ok(self
            .db
            .get(coll.name())
            .await?
            .unwrap_or_else(|| coll.record()))
    }

    /// Every loaded collection, sorted by name.
    pub async fn list(&self) -> Result<Vec<Arc<Collection>>, ReplayError> {
        self.load_all().await?;
        let mut colls: Vec<_> = self.colls.read().values().cloned().collect();
        colls.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(colls)
    }
}

fn validate_name(name: &str) -> Result<(), ReplayError> {
    let ok = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
        && name != "."
        && name != "..";
    if ok {
        Ok(())
    } else {
        Err(ReplayError::InvalidRequest(format!("invalid collection name {name:?}")))
    }
}
