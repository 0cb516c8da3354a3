//! Persisted collection records and the user-facing metadata they carry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Descriptive record for one collection. Unknown keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollMetadata {
    pub title: Option<String>,
    pub desc: Option<String>,
    /// Bytes stored after deduplication.
    pub dedup_size: u64,
    /// Total bytes of all imported archives.
    pub full_size: u64,
    /// Creation time, ms since the epoch.
    pub ctime: i64,
    /// Last modification time, ms since the epoch.
    pub mtime: i64,
    pub source: Option<String>,
    /// Kind of source the collection was imported from (`warc`, `wacz`, ...).
    pub source_type: Option<String>,
    /// Whether stored bodies are decoded at import.
    pub decode: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CollMetadata {
    /// Apply a JSON patch of top-level fields. Fields absent from `patch`
    /// keep their current value.
    pub fn merged(&self, patch: &Value) -> Result<Self, serde_json::Error> {
        let mut current = serde_json::to_value(self)?;
        if let (Value::Object(cur), Value::Object(over)) = (&mut current, patch) {
            for (k, v) in over {
                cur.insert(k.clone(), v.clone());
            }
        }
        serde_json::from_value(current)
    }
}

/// A collection as persisted in the collection-metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub name: String,
    /// Store kind: `archive` or `live`.
    #[serde(rename = "type", default = "default_coll_type")]
    pub coll_type: String,
    /// Raw replay policy, merged over the registry defaults when loaded.
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub metadata: CollMetadata,
}

fn default_coll_type() -> String {
    "archive".into()
}

impl CollectionRecord {
    pub fn is_live(&self) -> bool {
        self.coll_type == "live"
    }
}

/// Input of `CollectionRegistry::add_collection`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollection {
    pub name: String,
    #[serde(rename = "type", default = "default_coll_type")]
    pub coll_type: String,
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub metadata: CollMetadata,
}

impl NewCollection {
    pub fn into_record(self, now_ms: i64) -> CollectionRecord {
        let mut metadata = self.metadata;
        if metadata.ctime == 0 {
            metadata.ctime = now_ms;
        }
        metadata.mtime = now_ms;
        CollectionRecord {
            name: self.name,
            coll_type: self.coll_type,
            config: self.config,
            metadata,
        }
    }
}

/// Progress of a long-running collection import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum LoadProgress {
    Validating,
    Persisting,
    Importing { percent: u8 },
    Done,
}

/// Callback receiving [`LoadProgress`] events.
pub type ProgressFn<'a> = &'a (dyn Fn(LoadProgress) + Send + Sync);
