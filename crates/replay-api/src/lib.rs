//! # replay-api — Replay Router
//!
//! HTTP surface of the replay engine, built on Axum/Tower/Tokio. Every
//! request is classified into one of:
//!
//! - `/health/*` — liveness and readiness probes
//! - `/` — collection index and the live-redirect action
//! - `{static_prefix}*` — engine static assets (client rewriter, banner)
//! - `{api_prefix}*` — collection management API
//! - `{replay_prefix}{coll}/{timestamp}{modifier}/{url}` — replay
//!
//! and anything else is served by the root collection, when configured.
//! Replay requests for a collection that is unknown, or whose registry is
//! not ready within the readiness window, get an offline page instead of
//! a transport error.

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub use config::{AppConfig, ServerArgs};
pub use error::AppError;
pub use state::AppState;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use replay_collections::RegistryState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Assemble the full application router.
pub fn app(state: AppState) -> Router {
    let config = state.config.clone();

    // The API is called from replayed pages on other origins.
    let api = routes::api::router(&config.api_prefix).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let mut router = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/", get(routes::index::index))
        .merge(api)
        .merge(routes::replay::router(&config.replay_prefix))
        .fallback(routes::replay::root_fallback);

    if let Some(dir) = &config.static_dir {
        router = router.nest_service(config.static_prefix.trim_end_matches('/'), ServeDir::new(dir));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — 200 once the initial collection load has completed.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.state() {
        RegistryState::Ready => (StatusCode::OK, "ready"),
        RegistryState::Initializing => (StatusCode::SERVICE_UNAVAILABLE, "loading collections"),
        RegistryState::Uninitialized => (StatusCode::SERVICE_UNAVAILABLE, "collections not loaded"),
    }
}
