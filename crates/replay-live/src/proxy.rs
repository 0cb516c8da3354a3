//! # Live Proxy
//!
//! Resolves an archived URL to a live fetch target and performs the fetch.
//!
//! ## URL resolution
//!
//! 1. A host with a `host_proxy` entry is fetched through that entry's
//!    prefix (full URL, or path and query when `path_only`).
//! 2. Otherwise, with `host_proxy_only` set, the request is refused and no
//!    network traffic happens.
//! 3. Otherwise the URL goes through the configured `prefix`, as a full URL
//!    or (with `proxy_path_only`) as path and query only.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::RwLock;
use replay_core::temporal::datetime_to_timestamp;
use replay_core::{
    ArchiveRequest, Exchange, NotifySink, PageRecord, ReplayError, ReplayNotification,
    ResourceStore,
};

use crate::config::LiveProxyConfig;

/// Header carrying the live (de-archived) referrer to the upstream.
pub const PROXY_REFERER: &str = "x-proxy-referer";

/// Request headers that never travel upstream.
const DROPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
    "accept-encoding",
    "referer",
    "cookie",
];

/// Response headers that describe the upstream connection, not the body.
const DROPPED_RESPONSE_HEADERS: &[HeaderName] = &[
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::CONTENT_LENGTH,
];

/// The live-web [`ResourceStore`].
pub struct LiveProxy {
    config: LiveProxyConfig,
    client: reqwest::Client,
    notify: Arc<dyn NotifySink>,
    extra_headers: RwLock<HeaderMap>,
}

impl std::fmt::Debug for LiveProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveProxy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LiveProxy {
    pub fn new(config: LiveProxyConfig, client: reqwest::Client, notify: Arc<dyn NotifySink>) -> Self {
        Self {
            config,
            client,
            notify,
            extra_headers: RwLock::new(HeaderMap::new()),
        }
    }

    /// Build an HTTP client suitable for live fetches: redirects are
    /// returned to the caller rather than followed. `timeout_secs` is the
    /// client-wide ceiling; each fetch also applies the config's timeout.
    pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, ReplayError> {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ReplayError::Store(format!("failed to build HTTP client: {e}")))
    }

    pub fn config(&self) -> &LiveProxyConfig {
        &self.config
    }

    /// Resolve `url` to the URL actually fetched, or `None` if the proxy
    /// refuses it. May strip `headers` for hosts configured with
    /// `no_headers`.
    pub fn get_fetch_url(&self, url: &str, headers: &mut HeaderMap) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let host = match (parsed.host_str(), parsed.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => return None,
        };

        if let Some(entry) = self.config.host_proxy.get(&host) {
            if entry.no_headers {
                headers.clear();
            }
            return Some(if entry.path_only {
                format!("{}{}", entry.prefix, path_and_query(&parsed))
            } else {
                format!("{}{}", entry.prefix, url)
            });
        }

        if self.config.host_proxy_only {
            return None;
        }

        if self.config.proxy_path_only && !self.config.prefix.is_empty() {
            Some(format!("{}{}", self.config.prefix, path_and_query(&parsed)))
        } else {
            Some(format!("{}{}", self.config.prefix, url))
        }
    }

    /// Fetch `request` from the live web.
    ///
    /// `Ok(None)` when the URL is refused by host-proxy policy;
    /// `Err(LiveProxyFailure)` on transport failure or a status >= 400.
    pub async fn get_resource(
        &self,
        request: &ArchiveRequest,
        _prefix: &str,
    ) -> Result<Option<Exchange>, ReplayError> {
        let url = strip_fragment(&request.url);
        let mut headers = self.forward_headers(request);

        let Some(fetch_url) = self.get_fetch_url(url, &mut headers) else {
            tracing::debug!(url, "live proxy refused unmapped host");
            return Ok(None);
        };

        let body = if self.config.allow_body && !matches!(request.method, Method::GET | Method::HEAD) {
            request.body.clone()
        } else {
            None
        };

        let mut builder = self
            .client
            .request(request.method.clone(), &fetch_url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(url, fetch_url = %fetch_url, "live fetch failed: {e}");
                return Err(self.failure("fetch", url, &request.method, None));
            }
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            tracing::warn!(url, fetch_url = %fetch_url, status = status.as_u16(), "live fetch returned error status");
            return Err(self.failure("status", url, &request.method, Some(status.as_u16())));
        }

        let mut resp_headers = response.headers().clone();
        for name in DROPPED_RESPONSE_HEADERS {
            resp_headers.remove(name);
        }

        let payload: Bytes = match response.bytes().await {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(url, fetch_url = %fetch_url, "live body read failed: {e}");
                return Err(self.failure("fetch", url, &request.method, None));
            }
        };

        let cloned_body = self.config.clone_response.then(|| payload.clone());

        Ok(Some(Exchange {
            url: url.to_string(),
            timestamp: datetime_to_timestamp(&chrono::Utc::now()),
            status,
            headers: resp_headers,
            body: payload,
            is_live: true,
            cloned_body,
        }))
    }

    /// Post a `live-proxy-error` notification to the embedding page.
    /// Best-effort: delivery failures are the sink's concern.
    pub fn send_proxy_error(&self, kind: &str, url: &str, method: &str, status: Option<u16>) {
        self.notify.notify(ReplayNotification::LiveProxyError {
            kind: kind.to_string(),
            url: url.to_string(),
            method: method.to_string(),
            status,
        });
    }

    fn failure(&self, kind: &str, url: &str, method: &Method, status: Option<u16>) -> ReplayError {
        if self.config.message_on_proxy_errors {
            self.send_proxy_error(kind, url, method.as_str(), status);
        }
        ReplayError::LiveProxyFailure {
            url: url.to_string(),
            status,
        }
    }

    fn forward_headers(&self, request: &ArchiveRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let lower = name.as_str();
            if DROPPED_REQUEST_HEADERS.contains(&lower) || lower.starts_with("sec-fetch-") {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        if let Some(referrer) = request.referrer() {
            let live = self.live_referrer(referrer);
            if let Ok(value) = HeaderValue::from_str(live) {
                headers.insert(HeaderName::from_static(PROXY_REFERER), value);
            }
        }

        for (name, value) in self.extra_headers.read().iter() {
            headers.insert(name.clone(), value.clone());
        }
        headers
    }

    /// Map a referrer inside the replay namespace back to its live URL.
    fn live_referrer<'a>(&self, referrer: &'a str) -> &'a str {
        let prefix = self.config.archive_prefix.as_str();
        let Some(pos) = (!prefix.is_empty()).then(|| referrer.find(prefix)).flatten() else {
            return referrer;
        };
        let rest = &referrer[pos + prefix.len()..];
        ["/http://", "/https://"]
            .iter()
            .filter_map(|marker| rest.find(marker))
            .min()
            .map_or(referrer, |idx| &rest[idx + 1..])
    }
}

#[async_trait]
impl ResourceStore for LiveProxy {
    async fn lookup(
        &self,
        request: &ArchiveRequest,
        prefix: &str,
    ) -> Result<Option<Exchange>, ReplayError> {
        self.get_resource(request, prefix).await
    }

    async fn list_all(&self) -> Result<Vec<PageRecord>, ReplayError> {
        Ok(Vec::new())
    }

    fn is_live(&self) -> bool {
        true
    }

    fn update_headers(&self, headers: &HeaderMap) {
        *self.extra_headers.write() = headers.clone();
    }
}

fn path_and_query(url: &url::Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    }
}

fn strip_fragment(url: &str) -> &str {
    url.split_once('#').map_or(url, |(before, _)| before)
}
