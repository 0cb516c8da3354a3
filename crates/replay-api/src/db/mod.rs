//! # Database Persistence Layer
//!
//! Postgres persistence for collection records via SQLx.
//!
//! The database is **optional**. When a database URL is configured the
//! registry reads and writes records in the `collections` table; when
//! absent the server keeps them in a `MemoryCollectionDb` and they do not
//! survive restarts.

pub mod collections;

use sqlx::postgres::{PgPool, PgPoolOptions};

pub use collections::PgCollectionDb;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is given (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = url else {
        tracing::warn!(
            "DATABASE_URL not set, running with in-memory collection records. \
             Collections will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}
