//! # Application State
//!
//! Shared state for the Axum application: the collection registry and the
//! router configuration.

use std::sync::Arc;

use replay_collections::CollectionRegistry;

use crate::config::AppConfig;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CollectionRegistry>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(registry: Arc<CollectionRegistry>, config: AppConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }
}
