//! Collection record persistence.
//!
//! All operations act on the `collections` table. `config` and `metadata`
//! are stored as JSONB in the same shape the API serializes them.

use async_trait::async_trait;
use replay_collections::{CollMetadata, CollectionDb, CollectionRecord, DbError};
use sqlx::PgPool;

/// Postgres unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// [`CollectionDb`] backed by Postgres.
#[derive(Debug, Clone)]
pub struct PgCollectionDb {
    pool: PgPool,
}

impl PgCollectionDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionDb for PgCollectionDb {
    async fn list(&self) -> Result<Vec<CollectionRecord>, DbError> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            "SELECT name, coll_type, config, metadata FROM collections ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows.into_iter().map(CollectionRow::into_record).collect())
    }

    async fn get(&self, name: &str) -> Result<Option<CollectionRecord>, DbError> {
        let row = sqlx::query_as::<_, CollectionRow>(
            "SELECT name, coll_type, config, metadata FROM collections WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        Ok(row.map(CollectionRow::into_record))
    }

    async fn insert(&self, record: &CollectionRecord) -> Result<(), DbError> {
        let metadata = metadata_json(record)?;
        let result = sqlx::query(
            "INSERT INTO collections (name, coll_type, config, metadata)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.name)
        .bind(&record.coll_type)
        .bind(&record.config)
        .bind(&metadata)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(DbError::Duplicate(record.name.clone()))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn put(&self, record: &CollectionRecord) -> Result<(), DbError> {
        let metadata = metadata_json(record)?;
        sqlx::query(
            "INSERT INTO collections (name, coll_type, config, metadata)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (name) DO UPDATE
             SET coll_type = EXCLUDED.coll_type,
                 config = EXCLUDED.config,
                 metadata = EXCLUDED.metadata,
                 updated_at = now()",
        )
        .bind(&record.name)
        .bind(&record.coll_type)
        .bind(&record.config)
        .bind(&metadata)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM collections WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }
}

fn backend(err: sqlx::Error) -> DbError {
    DbError::Backend(err.to_string())
}

fn metadata_json(record: &CollectionRecord) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(&record.metadata)
        .map_err(|e| DbError::Backend(format!("failed to serialize metadata of {}: {e}", record.name)))
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct CollectionRow {
    name: String,
    coll_type: String,
    config: serde_json::Value,
    metadata: serde_json::Value,
}

impl CollectionRow {
    fn into_record(self) -> CollectionRecord {
        let metadata: CollMetadata = serde_json::from_value(self.metadata).unwrap_or_else(|e| {
            tracing::warn!(
                coll = %self.name,
                error = %e,
                "unreadable collection metadata in database, using defaults"
            );
            CollMetadata::default()
        });

        CollectionRecord {
            name: self.name,
            coll_type: self.coll_type,
            config: self.config,
            metadata,
        }
    }
}
