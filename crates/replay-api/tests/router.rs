//! # Integration Tests for the Replay Router
//!
//! Drives the assembled Axum router with `tower::ServiceExt::oneshot`
//! against an in-memory registry: health probes, replay dispatch, the
//! offline page, and the collection API lifecycle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use replay_api::{app, AppConfig, AppState};
use replay_collections::{
    CollMetadata, CollectionDb, CollectionRecord, CollectionRegistry, DbError, MemoryCollectionDb,
    MemoryStoreFactory,
};
use replay_core::Exchange;
use serde_json::{json, Value};
use tower::ServiceExt;

// -- Helpers ------------------------------------------------------------------

/// Delays every `list` so the initial load outlasts the readiness window.
struct SlowDb {
    inner: MemoryCollectionDb,
    delay: Duration,
}

#[async_trait]
impl CollectionDb for SlowDb {
    async fn list(&self) -> Result<Vec<CollectionRecord>, DbError> {
        tokio::time::sleep(self.delay).await;
        self.inner.list().await
    }

    async fn get(&self, name: &str) -> Result<Option<CollectionRecord>, DbError> {
        self.inner.get(name).await
    }

    async fn insert(&self, record: &CollectionRecord) -> Result<(), DbError> {
        self.inner.insert(record).await
    }

    async fn put(&self, record: &CollectionRecord) -> Result<(), DbError> {
        self.inner.put(record).await
    }

    async fn delete(&self, name: &str) -> Result<bool, DbError> {
        self.inner.delete(name).await
    }
}

fn site_record() -> CollectionRecord {
    CollectionRecord {
        name: "site".to_string(),
        coll_type: "archive".to_string(),
        config: json!({}),
        metadata: CollMetadata {
            title: Some("Example Site".to_string()),
            ..Default::default()
        },
    }
}

fn seeded_factory() -> Arc<MemoryStoreFactory> {
    let factory = MemoryStoreFactory::new();
    factory.seed(
        "site",
        vec![Exchange::new("http://example.com/", "20200101000000", StatusCode::OK).with_body(
            "text/html; charset=utf-8",
            "<html><head><title>Example</title></head><body>hello archive</body></html>",
        )],
    );
    Arc::new(factory)
}

fn registry_with(db: Arc<dyn CollectionDb>, config: &AppConfig) -> CollectionRegistry {
    CollectionRegistry::new(db, seeded_factory(), config.prefixes())
}

fn test_state(registry: CollectionRegistry, config: AppConfig) -> AppState {
    AppState::new(Arc::new(registry), config)
}

fn test_app() -> Router {
    let config = AppConfig::default();
    let db = Arc::new(MemoryCollectionDb::with_records([site_record()]));
    app(test_state(registry_with(db, &config), config))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn liveness_returns_ok() {
    let resp = test_app().oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ok");
}

#[tokio::test]
async fn readiness_tracks_registry_load() {
    let config = AppConfig::default();
    let db = Arc::new(MemoryCollectionDb::with_records([site_record()]));
    let state = test_state(registry_with(db, &config), config);

    let resp = app(state.clone()).oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.registry.load_all().await.unwrap();
    let resp = app(state).oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "ready");
}

// -- Replay -------------------------------------------------------------------

#[tokio::test]
async fn replay_path_serves_archived_capture() {
    let resp = test_app()
        .oneshot(get("/w/site/2020mp_/http://example.com/"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["memento-datetime"], "Wed, 01 Jan 2020 00:00:00 GMT");
    let body = body_string(resp).await;
    assert!(body.contains("hello archive"));
    assert!(body.contains("<!-- WB Insert -->"));
}

#[tokio::test]
async fn replay_path_without_modifier_serves_top_frame() {
    let resp = test_app()
        .oneshot(
            Request::builder()
                .uri("/w/site/2020/http://example.com/")
                .header(header::ACCEPT, "text/html,application/xhtml+xml")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains(r#"src="/w/site/2020mp_/http://example.com/""#));
}

#[tokio::test]
async fn unknown_collection_gets_offline_page() {
    let resp = test_app()
        .oneshot(get("/w/missing/2020mp_/http://example.com/"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_string(resp).await;
    assert!(body.contains("Archive Offline"));
    assert!(body.contains("<b>missing</b>"));
}

#[tokio::test]
async fn slow_registry_gets_offline_page_with_503() {
    let config = AppConfig {
        init_timeout: Duration::from_millis(20),
        ..Default::default()
    };
    let db = Arc::new(SlowDb {
        inner: MemoryCollectionDb::with_records([site_record()]),
        delay: Duration::from_millis(500),
    });
    let app = app(test_state(registry_with(db, &config), config));

    let resp = app
        .oneshot(get("/w/site/2020mp_/http://example.com/"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(body_string(resp).await.contains("still loading"));
}

#[tokio::test]
async fn replay_path_without_url_is_bad_request() {
    let resp = test_app().oneshot(get("/w/site/2020mp_/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_replay_path_is_negotiated_for_script_loads() {
    let resp = test_app()
        .oneshot(
            Request::builder()
                .uri("/w/site/202301010000001mp_/http://example.com/app.js")
                .header("sec-fetch-dest", "script")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/javascript"));
}

#[tokio::test]
async fn archive_miss_is_negotiated_not_found() {
    let resp = test_app()
        .oneshot(
            Request::builder()
                .uri("/w/site/2020mp_/http://example.com/app.js")
                .header("sec-fetch-dest", "script")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/javascript"));
}

#[tokio::test]
async fn root_collection_serves_unprefixed_paths() {
    let config = AppConfig::default();
    let db = Arc::new(MemoryCollectionDb::with_records([site_record()]));
    let registry = registry_with(db, &config).with_root("site");
    let app = app(test_state(registry, config));

    let resp = app
        .clone()
        .oneshot(get("/2020mp_/http://example.com/"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_string(resp).await.contains("hello archive"));

    // API paths are never handed to the root collection.
    let resp = app.oneshot(get("/api/unknown")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// -- Index & static -----------------------------------------------------------

#[tokio::test]
async fn index_lists_collections() {
    let resp = test_app().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains(r#"<a href="/w/site/">Example Site</a>"#));
}

#[tokio::test]
async fn redirect_action_goes_live() {
    let resp = test_app()
        .oneshot(get(
            "/?action=redirect&coll=site&url=http%3A%2F%2Fexample.com%2Fmissing&timestamp=2020",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://example.com/missing");
}

#[tokio::test]
async fn redirect_action_rejects_script_urls() {
    let resp = test_app()
        .oneshot(get("/?action=redirect&url=javascript%3Aalert(1)"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn static_assets_without_directory_are_404() {
    let resp = test_app().oneshot(get("/static/wombat.js")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// -- Collection API -----------------------------------------------------------

#[tokio::test]
async fn collection_lifecycle_through_api() {
    let app = test_app();

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/c/create",
            json!({"name": "fresh", "metadata": {"title": "Fresh"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    assert_eq!(created["name"], "fresh");
    assert_eq!(created["type"], "archive");
    assert_eq!(created["prefix"], "/w/fresh/");

    let resp = app.clone().oneshot(get("/api/colls")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let names: Vec<String> = body_json(resp).await["colls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["fresh", "site"]);

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/c/fresh/size",
            json!({"full_size": 2048, "dedup_size": 1024, "decode": true}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let metadata = body_json(resp).await;
    assert_eq!(metadata["full_size"], 2048);
    assert_eq!(metadata["dedup_size"], 1024);
    assert_eq!(metadata["decode"], true);
    assert_eq!(metadata["title"], "Fresh");

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/api/c/fresh?keep_file_handle=true")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app.oneshot(get("/api/c/fresh")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn duplicate_create_is_conflict() {
    let resp = test_app()
        .oneshot(post_json("/api/c/create", json!({"name": "site"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(resp).await["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn invalid_name_is_rejected() {
    let resp = test_app()
        .oneshot(post_json("/api/c/create", json!({"name": "../etc"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn metadata_patch_and_url_listing() {
    let app = test_app();

    let resp = app
        .clone()
        .oneshot(post_json("/api/c/site/metadata", json!({"desc": "crawl of example.com"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let metadata = body_json(resp).await;
    assert_eq!(metadata["desc"], "crawl of example.com");
    assert_eq!(metadata["title"], "Example Site");

    let resp = app.oneshot(get("/api/c/site/urls")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let urls = body_json(resp).await;
    assert_eq!(urls["urls"][0]["url"], "http://example.com/");
}

#[tokio::test]
async fn mutations_on_unknown_collection_are_404() {
    let app = test_app();
    let resp = app
        .clone()
        .oneshot(post_json("/api/c/nope/auth", json!({"headers": {"Authorization": "Bearer x"}})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app
        .oneshot(post_json("/api/c/nope/size", json!({"full_size": 1, "dedup_size": 1})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn registered_blob_is_replayed() {
    let app = test_app();
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/c/site/blob?url=blob%3Ahttp%3A%2F%2Fexample.com%2F1234")
                .header(header::CONTENT_TYPE, "text/plain")
                .body(Body::from("blob data"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = app
        .oneshot(get("/w/site/id_/blob:http://example.com/1234"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_string(resp).await, "blob data");
}
