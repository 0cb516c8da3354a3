//! # Collection-Metadata Store
//!
//! CRUD over [`CollectionRecord`]s keyed by collection name. The registry
//! is the only writer; `MemoryCollectionDb` backs tests and database-less
//! deployments, the Postgres implementation lives in `replay-api`.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use replay_core::ReplayError;
use thiserror::Error;

use crate::metadata::CollectionRecord;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DbError {
    /// Insert of a name that already exists.
    #[error("duplicate collection: {0}")]
    Duplicate(String),

    #[error("collection store backend error: {0}")]
    Backend(String),
}

impl From<DbError> for ReplayError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Duplicate(name) => ReplayError::DuplicateName(name),
            DbError::Backend(msg) => ReplayError::Persistence(msg),
        }
    }
}

/// Persisted collection records.
#[async_trait]
pub trait CollectionDb: Send + Sync {
    async fn list(&self) -> Result<Vec<CollectionRecord>, DbError>;

    async fn get(&self, name: &str) -> Result<Option<CollectionRecord>, DbError>;

    /// Insert a new record; [`DbError::Duplicate`] if the name exists.
    async fn insert(&self, record: &CollectionRecord) -> Result<(), DbError>;

    /// Insert or replace.
    async fn put(&self, record: &CollectionRecord) -> Result<(), DbError>;

    /// Returns whether a record was removed.
    async fn delete(&self, name: &str) -> Result<bool, DbError>;
}

/// In-memory [`CollectionDb`].
#[derive(Debug, Default)]
pub struct MemoryCollectionDb {
    records: DashMap<String, CollectionRecord>,
}

impl MemoryCollectionDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = CollectionRecord>) -> Self {
        let db = Self::new();
        for record in records {
            db.records.insert(record.name.clone(), record);
        }
        db
    }
}

#[async_trait]
impl CollectionDb for MemoryCollectionDb {
    async fn list(&self) -> Result<Vec<CollectionRecord>, DbError> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(records)
    }

    async fn get(&self, name: &str) -> Result<Option<CollectionRecord>, DbError> {
        Ok(self.records.get(name).map(|r| r.value().clone()))
    }

    async fn insert(&self, record: &CollectionRecord) -> Result<(), DbError> {
        match self.records.entry(record.name.clone()) {
            Entry::Occupied(_) => Err(DbError::Duplicate(record.name.clone())),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn put(&self, record: &CollectionRecord) -> Result<(), DbError> {
        self.records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, DbError> {
        Ok(self.records.remove(name).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(name: &str) -> CollectionRecord {
        CollectionRecord {
            name: name.into(),
            coll_type: "archive".into(),
            config: Value::Null,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let db = MemoryCollectionDb::new();
        db.insert(&record("a")).await.unwrap();
        assert_eq!(
            db.insert(&record("a")).await,
            Err(DbError::Duplicate("a".into()))
        );
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let db = MemoryCollectionDb::with_records([record("a")]);
        assert!(db.delete("a").await.unwrap());
        assert!(!db.delete("a").await.unwrap());
        assert!(db.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_sorted_by_name() {
        let db = MemoryCollectionDb::with_records([record("b"), record("a")]);
        let names: Vec<_> = db.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn errors_map_into_replay_taxonomy() {
        assert_eq!(
            ReplayError::from(DbError::Duplicate("x".into())),
            ReplayError::DuplicateName("x".into())
        );
        assert!(matches!(
            ReplayError::from(DbError::Backend("io".into())),
            ReplayError::Persistence(_)
        ));
    }
}
