//! # Collection API Routes
//!
//! JSON endpoints over the collection registry, mounted under the API
//! prefix (`/api/` by default):
//!
//! - `GET    colls`              — List loaded collections
//! - `POST   c/create`           — Add a collection and import its store
//! - `GET    c/{coll}`           — Collection record
//! - `DELETE c/{coll}`           — Delete (`?keep_file_handle=true` keeps the store's files)
//! - `GET    c/{coll}/urls`      — Every captured URL
//! - `POST   c/{coll}/metadata`  — Patch metadata fields
//! - `POST   c/{coll}/auth`      — Replace upstream auth headers
//! - `POST   c/{coll}/size`      — Set size counters
//! - `POST   c/{coll}/reload`    — Re-read the persisted record
//! - `POST   c/{coll}/blob`      — Register `blob:` URL content

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use replay_collections::{CollMetadata, Collection, CollectionRecord, LoadProgress, NewCollection};
use replay_core::PageRecord;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Assemble the collection API router under `api_prefix` (`/api/`).
pub fn router(api_prefix: &str) -> Router<AppState> {
    Router::new()
        .route(&format!("{api_prefix}colls"), get(list_colls))
        .route(&format!("{api_prefix}c/create"), post(create_coll))
        .route(&format!("{api_prefix}c/{{coll}}"), get(get_coll).delete(delete_coll))
        .route(&format!("{api_prefix}c/{{coll}}/urls"), get(list_urls))
        .route(&format!("{api_prefix}c/{{coll}}/metadata"), post(update_metadata))
        .route(&format!("{api_prefix}c/{{coll}}/auth"), post(update_auth))
        .route(&format!("{api_prefix}c/{{coll}}/size"), post(update_size))
        .route(&format!("{api_prefix}c/{{coll}}/reload"), post(reload_coll))
        .route(&format!("{api_prefix}c/{{coll}}/blob"), post(register_blob))
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A collection as reported by the API.
#[derive(Debug, Serialize, Deserialize)]
pub struct CollInfo {
    #[serde(flatten)]
    pub record: CollectionRecord,
    /// URL namespace the collection is replayed under.
    pub prefix: String,
    pub is_root: bool,
}

impl From<&Collection> for CollInfo {
    fn from(coll: &Collection) -> Self {
        Self {
            record: coll.record(),
            prefix: coll.prefix().to_string(),
            is_root: coll.is_root(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CollList {
    pub colls: Vec<CollInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UrlList {
    pub urls: Vec<PageRecord>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub keep_file_handle: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthRequest {
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SizeRequest {
    pub full_size: u64,
    pub dedup_size: u64,
    #[serde(default)]
    pub decode: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BlobParams {
    pub url: String,
}

/// Outcome of a mutation that returns no entity.
#[derive(Debug, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::Validation(err.body_text()))
}

async fn require_coll(state: &AppState, name: &str) -> Result<Arc<Collection>, AppError> {
    state
        .registry
        .get_coll(name)
        .await
        .ok_or_else(|| AppError::unknown_collection(name))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_colls(State(state): State<AppState>) -> Result<Json<CollList>, AppError> {
    let colls = state.registry.list().await?;
    Ok(Json(CollList {
        colls: colls.iter().map(|c| CollInfo::from(c.as_ref())).collect(),
    }))
}

async fn create_coll(
    State(state): State<AppState>,
    body: Result<Json<NewCollection>, JsonRejection>,
) -> Result<(StatusCode, Json<CollInfo>), AppError> {
    let data = extract_json(body)?;
    let name = data.name.clone();
    let progress = move |event: LoadProgress| {
        tracing::debug!(coll = %name, ?event, "collection load progress");
    };
    let coll = state.registry.add_collection(data, &progress).await?;
    Ok((StatusCode::CREATED, Json(CollInfo::from(coll.as_ref()))))
}

async fn get_coll(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CollInfo>, AppError> {
    let coll = require_coll(&state, &name).await?;
    Ok(Json(CollInfo::from(coll.as_ref())))
}

async fn delete_coll(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<Ack>, AppError> {
    if !state.registry.delete_coll(&name, params.keep_file_handle).await? {
        return Err(AppError::unknown_collection(&name));
    }
    Ok(Json(Ack { ok: true }))
}

async fn list_urls(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<UrlList>, AppError> {
    let coll = require_coll(&state, &name).await?;
    let urls = coll.list_all().await?;
    Ok(Json(UrlList { urls }))
}

async fn update_metadata(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<CollMetadata>, AppError> {
    let patch = extract_json(body)?;
    if !patch.is_object() {
        return Err(AppError::Validation("metadata patch must be a JSON object".into()));
    }
    state
        .registry
        .update_metadata(&name, &patch)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::unknown_collection(&name))
}

async fn update_auth(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<AuthRequest>, JsonRejection>,
) -> Result<Json<Ack>, AppError> {
    let req = extract_json(body)?;
    if !state.registry.update_auth(&name, req.headers).await? {
        return Err(AppError::unknown_collection(&name));
    }
    Ok(Json(Ack { ok: true }))
}

async fn update_size(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Result<Json<SizeRequest>, JsonRejection>,
) -> Result<Json<CollMetadata>, AppError> {
    let req = extract_json(body)?;
    state
        .registry
        .update_size(&name, req.full_size, req.dedup_size, req.decode)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::unknown_collection(&name))
}

async fn reload_coll(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<CollInfo>, AppError> {
    if !state.registry.reload(&name).await? {
        return Err(AppError::unknown_collection(&name));
    }
    let coll = require_coll(&state, &name).await?;
    Ok(Json(CollInfo::from(coll.as_ref())))
}

async fn register_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<BlobParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Ack>, AppError> {
    let coll = require_coll(&state, &name).await?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");
    coll.register_blob(&params.url, content_type, body)?;
    Ok(Json(Ack { ok: true }))
}
