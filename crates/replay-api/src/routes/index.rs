//! Collection index page and the "try live" redirect action.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use replay_core::notfound::html_escape;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct IndexParams {
    pub action: Option<String>,
    pub coll: Option<String>,
    pub url: Option<String>,
    pub timestamp: Option<String>,
}

/// `GET /`. With `?action=redirect&url=...` (the target of the not-found
/// page's live link) redirects to the live URL; otherwise lists the
/// loaded collections.
pub async fn index(
    State(state): State<AppState>,
    Query(params): Query<IndexParams>,
) -> Result<Response, AppError> {
    if params.action.as_deref() == Some("redirect") {
        return live_redirect(&params);
    }

    let colls = state.registry.list().await?;
    let mut items = String::new();
    for coll in &colls {
        let metadata = coll.metadata();
        let title = metadata.title.as_deref().unwrap_or(coll.name());
        items.push_str(&format!(
            "<li><a href=\"{}\">{}</a> <small>{}</small></li>\n",
            html_escape(coll.prefix()),
            html_escape(title),
            html_escape(coll.coll_type()),
        ));
    }
    if colls.is_empty() {
        items.push_str("<li>No collections loaded.</li>\n");
    }
    Ok(Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Collections</title></head>\n<body>\n<h2>Collections</h2>\n<ul>\n{items}</ul>\n</body>\n</html>\n"
    ))
    .into_response())
}

fn live_redirect(params: &IndexParams) -> Result<Response, AppError> {
    let raw = params
        .url
        .as_deref()
        .ok_or_else(|| AppError::Validation("redirect requires a url".into()))?;
    let target = url::Url::parse(raw)
        .map_err(|e| AppError::Validation(format!("invalid redirect url: {e}")))?;
    if !matches!(target.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "refusing to redirect to {} url",
            target.scheme()
        )));
    }
    tracing::info!(
        coll = params.coll.as_deref().unwrap_or(""),
        timestamp = params.timestamp.as_deref().unwrap_or(""),
        url = %target,
        "redirecting to live url"
    );
    Ok((StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response())
}
