//! # Replay Routes
//!
//! Paths of the form `{replay_prefix}{coll}/[{timestamp}{modifier}]/{url}`
//! are handed to the named collection. Anything unrouted goes to the root
//! collection when one is configured.
//!
//! The raw request path is used rather than the decoded `Path` capture:
//! the archived URL must reach the collection exactly as the client sent
//! it, percent-escapes included.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use bytes::Bytes;
use replay_core::notfound::{html_escape, not_found, text_response};
use replay_core::{ArchiveRequest, Destination};

use crate::state::AppState;

pub fn router(replay_prefix: &str) -> Router<AppState> {
    Router::new().route(&format!("{replay_prefix}{{coll}}/{{*rest}}"), any(replay))
}

async fn replay(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let Some((coll, rest)) = path
        .strip_prefix(state.config.replay_prefix.as_str())
        .and_then(|p| p.split_once('/'))
    else {
        return offline_page("", StatusCode::NOT_FOUND);
    };
    let rest = with_query(rest, &uri);
    serve(&state, coll, &rest, method, headers, body).await
}

/// Unrouted requests: served by the root collection, if there is one.
pub async fn root_fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path();
    let reserved = path.starts_with(state.config.api_prefix.as_str())
        || path.starts_with(state.config.static_prefix.as_str());
    let root = match state.registry.root() {
        Some(root) if !reserved => root.to_string(),
        _ => return (StatusCode::NOT_FOUND, "not found").into_response(),
    };
    let rest = with_query(path.trim_start_matches('/'), &uri);
    serve(&state, &root, &rest, method, headers, body).await
}

fn with_query(rest: &str, uri: &Uri) -> String {
    match uri.query() {
        Some(q) => format!("{rest}?{q}"),
        None => rest.to_string(),
    }
}

async fn serve(
    state: &AppState,
    coll: &str,
    rest: &str,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let lookup = tokio::time::timeout(state.config.init_timeout, state.registry.get_coll(coll)).await;
    let coll = match lookup {
        Ok(Some(coll)) => coll,
        Ok(None) => {
            tracing::debug!(coll, "replay request for unknown collection");
            return offline_page(coll, StatusCode::NOT_FOUND);
        }
        Err(_) => {
            tracing::warn!(coll, state = ?state.registry.state(), "collection registry not ready in time");
            return offline_page(coll, StatusCode::SERVICE_UNAVAILABLE);
        }
    };

    let body = (!body.is_empty()).then_some(body);
    let destination = Destination::from_headers(&headers);
    let request = match ArchiveRequest::from_replay_path(rest, method, headers, body) {
        Ok(request) => request,
        Err(e) => {
            let message = e.to_string();
            return not_found(&destination, rest, Some(&message), e.status()).map(Body::from);
        }
    };

    coll.handle_request(request).await.map(Body::from)
}

/// Page shown when a collection is missing or the registry is still
/// loading.
fn offline_page(coll: &str, status: StatusCode) -> Response {
    let detail = if status == StatusCode::SERVICE_UNAVAILABLE {
        "The archive is still loading. Reload this page in a moment.".to_string()
    } else if coll.is_empty() {
        "No collection was named in this address.".to_string()
    } else {
        format!("The collection <b>{}</b> is not installed here.", html_escape(coll))
    };
    let content = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Archive Offline</title></head>
<body>
<h2>Archive Offline</h2>
<p>{detail}</p>
<p><a href="/">Back to the collection index</a></p>
</body>
</html>
"#
    );
    text_response(content, "text/html; charset=utf-8", status).map(Body::from)
}
