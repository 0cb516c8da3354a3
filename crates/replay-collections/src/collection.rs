//! # Collection
//!
//! One archived capture plus its replay policy. `handle_request` turns a
//! parsed replay request into exactly one response:
//!
//! ```text
//! canonical redirect ─► synthetic routes ─► URL check ─► top frame
//!        │                    │                 │            │
//!       301            module decl /        400 page    frame page
//!                      srcdoc / blob
//!                                                           ▼
//!                     primary store ─► live fallback ─► header policy
//!                           │                │          + rewriting
//!                      proxy error      not-found page
//! ```
//!
//! Store failures never escape: they are logged and treated as a miss so
//! the next tier gets its chance.

use std::borrow::Cow;
use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, StatusCode};
use parking_lot::RwLock;
use replay_core::notfound::{self, NotFoundQuery};
use replay_core::temporal::timestamp_to_datetime;
use replay_core::{
    ArchiveRequest, Exchange, PageRecord, ReplayError, ReplayResponse, ResourceStore,
};
use replay_live::LiveProxy;
use tracing::{debug, warn};

use crate::config::{CollConfig, Prefixes};
use crate::frame::{self, HeadInsert, TopFrame, WRAPPED_MODULE_DECL};
use crate::headers;
use crate::metadata::{CollMetadata, CollectionRecord};
use crate::rewrite::{ContentRewriter, RewriteContext};

/// Everything a [`Collection`] is built from.
pub struct CollectionParts {
    pub record: CollectionRecord,
    pub config: CollConfig,
    /// Primary store, exclusively owned by the collection.
    pub store: Box<dyn ResourceStore>,
    /// Consulted when the primary store has no capture.
    pub live_fallback: Option<LiveProxy>,
    pub rewriter: Arc<dyn ContentRewriter>,
    pub is_root: bool,
}

/// A registered collection.
pub struct Collection {
    name: String,
    coll_type: String,
    prefix: String,
    static_prefix: String,
    is_root: bool,
    store: Box<dyn ResourceStore>,
    live_fallback: Option<LiveProxy>,
    rewriter: Arc<dyn ContentRewriter>,
    config: RwLock<Arc<CollConfig>>,
    metadata: RwLock<CollMetadata>,
    raw_config: RwLock<serde_json::Value>,
    blobs: DashMap<String, (HeaderValue, Bytes)>,
}

enum Replay {
    Found(ReplayResponse),
    ProxyFailed(StatusCode),
    Missing,
}

impl Collection {
    pub fn new(parts: CollectionParts, prefixes: &Prefixes) -> Self {
        let prefix = prefix_for(prefixes, &parts.record.name, parts.is_root);
        parts.store.update_headers(&parts.config.header_map());
        Self {
            name: parts.record.name,
            coll_type: parts.record.coll_type,
            prefix,
            static_prefix: prefixes.static_prefix.clone(),
            is_root: parts.is_root,
            store: parts.store,
            live_fallback: parts.live_fallback,
            rewriter: parts.rewriter,
            config: RwLock::new(Arc::new(parts.config)),
            metadata: RwLock::new(parts.record.metadata),
            raw_config: RwLock::new(parts.record.config),
            blobs: DashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn coll_type(&self) -> &str {
        &self.coll_type
    }

    /// URL namespace of this collection, e.g. `/w/site/`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn is_live(&self) -> bool {
        self.store.is_live()
    }

    pub fn config(&self) -> Arc<CollConfig> {
        self.config.read().clone()
    }

    pub fn metadata(&self) -> CollMetadata {
        self.metadata.read().clone()
    }

    pub(crate) fn set_metadata(&self, metadata: CollMetadata) {
        *self.metadata.write() = metadata;
    }

    /// Current record as it would be persisted.
    pub fn record(&self) -> CollectionRecord {
        CollectionRecord {
            name: self.name.clone(),
            coll_type: self.coll_type.clone(),
            config: self.raw_config.read().clone(),
            metadata: self.metadata(),
        }
    }

    /// Replace the config after an auth change and push the new headers to
    /// the store.
    pub(crate) fn set_config(&self, raw: serde_json::Value, config: CollConfig) {
        self.store.update_headers(&config.header_map());
        *self.raw_config.write() = raw;
        *self.config.write() = Arc::new(config);
    }

    pub async fn list_all(&self) -> Result<Vec<PageRecord>, ReplayError> {
        self.store.list_all().await
    }

    /// Make `blob:` URL content available to replayed pages.
    pub fn register_blob(&self, url: &str, content_type: &str, body: Bytes) -> Result<(), ReplayError> {
        if !url.starts_with("blob:") {
            return Err(ReplayError::InvalidRequest(format!("not a blob url: {url}")));
        }
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|_| ReplayError::InvalidRequest(format!("bad content type {content_type:?}")))?;
        self.blobs.insert(url.to_string(), (content_type, body));
        Ok(())
    }

    /// Release the owned store.
    pub async fn close(&self) {
        self.store.close().await;
        self.blobs.clear();
    }

    /// Resolve one replay request to a response.
    pub async fn handle_request(&self, mut request: ArchiveRequest) -> ReplayResponse {
        let config = self.config();

        if config.canon_redirect {
            if let Some(response) = self.canon_redirect(&request) {
                return response;
            }
        }

        if request.url == WRAPPED_MODULE_DECL {
            return frame::wrapped_module_decl();
        }
        let synthetic = if let Some(encoded) = request.url.strip_prefix("srcdoc:") {
            Some(self.srcdoc_exchange(&request.url, encoded))
        } else if request.url.starts_with("blob:") {
            Some(self.blob_exchange(&request.url))
        } else {
            None
        };
        if let Some(result) = synthetic {
            return match result {
                Ok(exchange) => self.finish(exchange, &request, &config),
                Err(e) => self.not_found(&request, Some(&e.to_string()), e.status()),
            };
        }

        match request.parsed_url() {
            Ok(mut parsed) => {
                if parsed.fragment().is_some() {
                    parsed.set_fragment(None);
                    request.url = parsed.into();
                }
            }
            Err(e) => {
                debug!(coll = %self.name, error = %e, "rejecting replay request");
                return self.not_found(&request, Some(&e.to_string()), e.status());
            }
        }

        if request.modifier.is_empty() && config.top_frame && request.destination.is_document() {
            return self.top_frame(&request, &config);
        }

        match self.get_replay_response(&request, &config).await {
            Replay::Found(response) => response,
            Replay::ProxyFailed(status) => notfound::proxy_not_found(&request.url, status),
            Replay::Missing => self.not_found(&request, None, StatusCode::NOT_FOUND),
        }
    }

    /// Redirect scheme-less and path-less URLs to their canonical form.
    fn canon_redirect(&self, request: &ArchiveRequest) -> Option<ReplayResponse> {
        let canonical = canonical_url(&request.url)?;
        let location = if request.timestamp.is_empty() && request.modifier.is_empty() {
            format!("{}{}", self.prefix, canonical)
        } else {
            format!(
                "{}{}{}/{}",
                self.prefix, request.timestamp, request.modifier, canonical
            )
        };
        Some(frame::redirect(&location, StatusCode::MOVED_PERMANENTLY))
    }

    fn srcdoc_exchange(&self, url: &str, encoded: &str) -> Result<Exchange, ReplayError> {
        let html = STANDARD
            .decode(encoded)
            .or_else(|_| URL_SAFE.decode(encoded))
            .map_err(|e| ReplayError::InvalidRequest(format!("srcdoc: {e}")))?;
        Ok(Exchange::new(url, "", StatusCode::OK).with_body("text/html; charset=utf-8", html))
    }

    fn blob_exchange(&self, url: &str) -> Result<Exchange, ReplayError> {
        let entry = self
            .blobs
            .get(url)
            .ok_or_else(|| ReplayError::NotFound(url.to_string()))?;
        let (content_type, body) = entry.value().clone();
        let mut exchange = Exchange::new(url, "", StatusCode::OK);
        exchange.headers.insert(CONTENT_TYPE, content_type);
        exchange.body = body;
        Ok(exchange)
    }

    fn top_frame(&self, request: &ArchiveRequest, config: &CollConfig) -> ReplayResponse {
        frame::make_top_frame(&TopFrame {
            url: &request.url,
            timestamp: &request.timestamp,
            coll: &self.name,
            frame_prefix: config.base_frame_prefix.as_deref().unwrap_or(&self.prefix),
            static_prefix: &self.static_prefix,
            base_frame_url: config.base_frame_url.as_deref(),
            base_frame_hash_replay: config.base_frame_hash_replay,
        })
    }

    /// Primary store, then the live fallback.
    async fn get_replay_response(&self, request: &ArchiveRequest, config: &CollConfig) -> Replay {
        let lookup: Cow<'_, ArchiveRequest> =
            if request.method == Method::POST && !config.no_post_to_get && !self.store.is_live() {
                Cow::Owned(post_to_get(request))
            } else {
                Cow::Borrowed(request)
            };

        let mut exchange = match self.store.lookup(&lookup, &self.prefix).await {
            Ok(found) => found,
            Err(e @ ReplayError::LiveProxyFailure { .. }) if self.store.is_live() => {
                return Replay::ProxyFailed(e.status());
            }
            Err(e) => {
                warn!(coll = %self.name, url = %request.url, error = %e, "store lookup failed");
                None
            }
        };

        if exchange.is_none() {
            if let Some(live) = &self.live_fallback {
                exchange = match live.lookup(request, &self.prefix).await {
                    Ok(found) => found,
                    Err(e) => {
                        warn!(coll = %self.name, url = %request.url, error = %e, "live fallback failed");
                        None
                    }
                };
            }
        }

        match exchange {
            Some(exchange) => Replay::Found(self.finish(exchange, request, config)),
            None => Replay::Missing,
        }
    }

    /// Apply header policy and rewriting to a found exchange.
    fn finish(&self, mut exchange: Exchange, request: &ArchiveRequest, config: &CollConfig) -> ReplayResponse {
        let timestamp = if exchange.timestamp.is_empty() {
            request.timestamp.clone()
        } else {
            exchange.timestamp.clone()
        };

        headers::strip_unsafe(&mut exchange.headers, &config.strip_headers);
        if config.co_headers {
            headers::add_cross_origin_isolation(&mut exchange.headers);
        }
        headers::set_csp(&mut exchange.headers, &config.csp);
        if exchange.is_redirect() {
            headers::rewrite_location(
                &mut exchange.headers,
                &exchange.url,
                &self.prefix,
                &timestamp,
                &request.modifier,
            );
        }
        let set_cookie = headers::rewrite_set_cookies(&mut exchange.headers, &self.prefix);
        let date = timestamp_to_datetime(&timestamp).unwrap_or_else(Utc::now);
        if !exchange.is_live {
            headers::add_memento_datetime(&mut exchange.headers, &date);
        }

        let rewrite = request.modifier != "id_" && !config.is_no_rewrite(&exchange.url);
        if rewrite {
            let head_insert = (exchange.mime_type().as_deref() == Some("text/html")).then(|| {
                let top_url = format!("{}{}/{}", self.prefix, request.timestamp, exchange.url);
                frame::make_head_insert(&HeadInsert {
                    url: &exchange.url,
                    timestamp: &timestamp,
                    request_ts: &request.timestamp,
                    date,
                    top_url: &top_url,
                    prefix: &self.prefix,
                    static_prefix: &self.static_prefix,
                    coll: &self.name,
                    preset_cookie: config.preset_cookie.as_deref().unwrap_or(""),
                    set_cookie: set_cookie.as_deref(),
                    is_live: exchange.is_live,
                    referrer: request.referrer().unwrap_or(""),
                    convert_post_to_get: config.convert_post_to_get,
                    inject_scripts: &config.inject_scripts,
                    inject_rel_canon: config.inject_rel_canon,
                })
            });
            let url = exchange.url.clone();
            let ctx = RewriteContext {
                prefix: &self.prefix,
                url: &url,
                timestamp: &timestamp,
                modifier: &request.modifier,
                destination: &request.destination,
                head_insert: head_insert.as_deref(),
            };
            if let Err(e) = self.rewriter.rewrite(&mut exchange, &ctx) {
                warn!(coll = %self.name, url = %url, error = %e, "rewrite failed, serving original body");
            }
        }

        let mut response = exchange.into_response();
        // HEAD keeps the Content-Length of the body it would have sent.
        if request.method == Method::HEAD {
            *response.body_mut() = Bytes::new();
        }
        response
    }

    fn not_found(&self, request: &ArchiveRequest, message: Option<&str>, status: StatusCode) -> ReplayResponse {
        notfound::not_found_by_type(&NotFoundQuery {
            destination: &request.destination,
            url: &request.url,
            timestamp: &request.timestamp,
            coll: &self.name,
            message,
            status,
        })
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("type", &self.coll_type)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// URL namespace of collection `name`.
pub fn prefix_for(prefixes: &Prefixes, name: &str, is_root: bool) -> String {
    if is_root {
        prefixes.root.clone()
    } else {
        format!("{}{}/", prefixes.main, name)
    }
}

const OPAQUE_SCHEMES: &[&str] = &["about:", "data:", "blob:", "srcdoc:", "javascript:", "mailto:"];

/// Canonical form of `url`, or `None` when it is already canonical.
fn canonical_url(url: &str) -> Option<String> {
    if url == WRAPPED_MODULE_DECL || OPAQUE_SCHEMES.iter().any(|s| url.starts_with(s)) {
        return None;
    }
    let absolute = if let Some(rest) = url.strip_prefix("//") {
        format!("http://{rest}")
    } else if scheme_end(url).is_some() {
        url.to_string()
    } else {
        format!("http://{url}")
    };

    // `http://host` and `http://host?q` gain the root path.
    let after_scheme = scheme_end(&absolute).map_or(0, |end| end + 3);
    let rest = &absolute[after_scheme..];
    let authority_end = after_scheme + rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let canonical = if absolute[authority_end..].starts_with('/') || authority_end == after_scheme {
        absolute
    } else {
        format!("{}/{}", &absolute[..authority_end], &absolute[authority_end..])
    };
    (canonical != url).then_some(canonical)
}

/// Byte offset of the `://` ending a leading URL scheme. A `://` inside
/// the path or query does not count.
fn scheme_end(url: &str) -> Option<usize> {
    let end = url.find("://")?;
    let scheme = &url[..end];
    let valid = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.'));
    valid.then_some(end)
}

/// POST lookups are keyed by the GET URL carrying the form body.
fn post_to_get(request: &ArchiveRequest) -> ArchiveRequest {
    let body = request.body.as_deref().unwrap_or_default();
    let content_type = request
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let encoded = if content_type.starts_with("application/x-www-form-urlencoded") {
        String::from_utf8_lossy(body).into_owned()
    } else if content_type.starts_with("application/json") {
        json_to_query(body)
    } else {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("__wb_post_data", &STANDARD.encode(body))
            .finish()
    };

    let sep = if request.url.contains('?') { '&' } else { '?' };
    let mut url = format!("{}{sep}__wb_method=post", request.url);
    if !encoded.is_empty() {
        url.push('&');
        url.push_str(&encoded);
    }

    let mut converted = request.clone().with_method(Method::GET, None);
    converted.url = url;
    converted
}

fn json_to_query(body: &[u8]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice::<serde_json::Value>(body) {
        for (key, value) in map {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            query.append_pair(&key, &value);
        }
    }
    query.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms() {
        assert_eq!(canonical_url("//example.com/").as_deref(), Some("http://example.com/"));
        assert_eq!(canonical_url("example.com/").as_deref(), Some("http://example.com/"));
        assert_eq!(canonical_url("https://example.com").as_deref(), Some("https://example.com/"));
        assert_eq!(
            canonical_url("https://example.com?a=1").as_deref(),
            Some("https://example.com/?a=1")
        );
        assert_eq!(canonical_url("https://example.com/x"), None);
        assert_eq!(
            canonical_url("example.com/?u=http://x").as_deref(),
            Some("http://example.com/?u=http://x")
        );
        assert_eq!(canonical_url("example.com?q=1").as_deref(), Some("http://example.com/?q=1"));
        assert_eq!(canonical_url("https://example.com/?u=http://x"), None);
        assert_eq!(canonical_url("blob:https://example.com/1"), None);
        assert_eq!(canonical_url(WRAPPED_MODULE_DECL), None);
    }

    #[test]
    fn form_post_becomes_get_query() {
        let req = ArchiveRequest::new("http://example.com/search?x=1", "", "mp_")
            .with_method(Method::POST, Some(Bytes::from_static(b"q=rust")))
            .with_header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        let get = post_to_get(&req);
        assert_eq!(get.method, Method::GET);
        assert_eq!(get.url, "http://example.com/search?x=1&__wb_method=post&q=rust");
        assert!(get.body.is_none());
    }

    #[test]
    fn json_post_flattens_keys() {
        let req = ArchiveRequest::new("http://example.com/api", "", "mp_")
            .with_method(Method::POST, Some(Bytes::from_static(br#"{"a":"b","n":2}"#)))
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(
            post_to_get(&req).url,
            "http://example.com/api?__wb_method=post&a=b&n=2"
        );
    }
}
