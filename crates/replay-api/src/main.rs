//! # replay-server — Binary Entry Point
//!
//! Starts the Axum HTTP server for the replay engine. Binds to a
//! configurable port (default 8080).

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use replay_api::db::{init_pool, PgCollectionDb};
use replay_api::{AppState, ServerArgs};
use replay_collections::{CollectionDb, CollectionRegistry, MemoryCollectionDb, MemoryStoreFactory};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = args.app_config();
    let default_config = args
        .default_config()
        .context("REPLAY_DEFAULT_CONFIG is not valid JSON")?;

    // Collection records: Postgres when configured, in-memory otherwise.
    let db: Arc<dyn CollectionDb> = match init_pool(args.database_url.as_deref())
        .await
        .context("database initialization failed")?
    {
        Some(pool) => Arc::new(PgCollectionDb::new(pool)),
        None => Arc::new(MemoryCollectionDb::new()),
    };

    let mut registry = CollectionRegistry::new(db, Arc::new(MemoryStoreFactory::new()), config.prefixes())
        .with_default_config(default_config);
    if let Some(root) = &args.root_coll {
        registry = registry.with_root(root.clone());
    }
    let registry = Arc::new(registry);

    // Load in the background; replay requests wait up to the readiness
    // window for it.
    let loader = registry.clone();
    tokio::spawn(async move {
        if let Err(e) = loader.load_all().await {
            tracing::error!(error = %e, "initial collection load failed");
        }
    });

    let app = replay_api::app(AppState::new(registry, config));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("replay server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
