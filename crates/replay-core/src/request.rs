//! # Archive Requests
//!
//! An intercepted request, decoded out of the replay namespace. The part of
//! a replay path after the collection prefix has the shape
//!
//! ```text
//! [<timestamp>][<modifier>]/<url>
//! ```
//!
//! where `timestamp` is up to 14 digits and `modifier` is a short lowercase
//! tag ending in `_` (`mp_`, `id_`, `if_`, `wkrf_`, ...). Both are optional;
//! a path that does not start with a timestamp/modifier segment is taken to
//! be the URL itself.

use bytes::Bytes;
use http::header::{ACCEPT, COOKIE, REFERER};
use http::{HeaderMap, Method};

use crate::error::ReplayError;
use crate::temporal::{is_timestamp, TIMESTAMP_LEN};

/// The kind of resource the client expects, from `Sec-Fetch-Dest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Destination {
    /// `fetch()` / XHR with no particular destination.
    #[default]
    Empty,
    Json,
    Script,
    Style,
    Document,
    Embed,
    Iframe,
    Frame,
    Image,
    Font,
    /// Any other destination string.
    Other(String),
}

impl Destination {
    /// Parse a `Sec-Fetch-Dest` value.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "empty" => Self::Empty,
            "json" => Self::Json,
            "script" | "worker" | "sharedworker" | "serviceworker" => Self::Script,
            "style" => Self::Style,
            "document" => Self::Document,
            "embed" | "object" => Self::Embed,
            "iframe" => Self::Iframe,
            "frame" => Self::Frame,
            "image" => Self::Image,
            "font" => Self::Font,
            other => Self::Other(other.to_string()),
        }
    }

    /// Infer the destination of a request. Clients that do not send
    /// `Sec-Fetch-Dest` are treated as document loads when they accept HTML.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some(dest) = header_str(headers, "sec-fetch-dest") {
            return Self::parse(dest);
        }
        match header_str(headers, ACCEPT.as_str()) {
            Some(accept) if accept.contains("text/html") => Self::Document,
            _ => Self::Empty,
        }
    }

    /// Whether a response for this destination is rendered as a page.
    pub fn is_document(&self) -> bool {
        matches!(
            self,
            Self::Document | Self::Embed | Self::Iframe | Self::Frame
        )
    }
}

/// Request mode, from `Sec-Fetch-Mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestMode {
    Navigate,
    Cors,
    NoCors,
    SameOrigin,
    #[default]
    Unspecified,
}

impl RequestMode {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        match header_str(headers, "sec-fetch-mode") {
            Some("navigate") => Self::Navigate,
            Some("cors") => Self::Cors,
            Some("no-cors") => Self::NoCors,
            Some("same-origin") => Self::SameOrigin,
            _ => Self::Unspecified,
        }
    }
}

/// A request for an archived resource.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    /// Target URL of the archived resource (may still be non-canonical).
    pub url: String,
    /// Requested capture timestamp; empty means "latest".
    pub timestamp: String,
    /// Replay modifier, e.g. `mp_`. Empty for top-frame requests.
    pub modifier: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub mode: RequestMode,
}

impl ArchiveRequest {
    /// A plain GET for `url` at `timestamp` with the given modifier.
    pub fn new(url: impl Into<String>, timestamp: impl Into<String>, modifier: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timestamp: timestamp.into(),
            modifier: modifier.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            destination: Destination::Document,
            mode: RequestMode::Unspecified,
        }
    }

    /// Parse the part of a replay path following the collection prefix.
    ///
    /// `rest` must include the original query string, if any.
    pub fn from_replay_path(
        rest: &str,
        method: Method,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Self, ReplayError> {
        let (timestamp, modifier, url) = split_replay_path(rest)?;
        if url.is_empty() {
            return Err(ReplayError::InvalidRequest(format!(
                "no url in replay path {rest:?}"
            )));
        }
        let destination = Destination::from_headers(&headers);
        let mode = RequestMode::from_headers(&headers);
        Ok(Self {
            url: url.to_string(),
            timestamp: timestamp.to_string(),
            modifier: modifier.to_string(),
            method,
            headers,
            body,
            destination,
            mode,
        })
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_method(mut self, method: Method, body: Option<Bytes>) -> Self {
        self.method = method;
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn referrer(&self) -> Option<&str> {
        header_str(&self.headers, REFERER.as_str())
    }

    pub fn cookie(&self) -> Option<&str> {
        header_str(&self.headers, COOKIE.as_str())
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Parse [`Self::url`] as an absolute URL.
    pub fn parsed_url(&self) -> Result<url::Url, ReplayError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| ReplayError::InvalidRequest(format!("{}: {e}", self.url)))?;
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ReplayError::InvalidRequest(format!(
                "{}: missing host",
                self.url
            )));
        }
        Ok(parsed)
    }
}

/// Split `rest` into `(timestamp, modifier, url)`.
fn split_replay_path(rest: &str) -> Result<(&str, &str, &str), ReplayError> {
    let Some((first, remainder)) = rest.split_once('/') else {
        return Ok(("", "", rest));
    };

    let digits = first.bytes().take_while(u8::is_ascii_digit).count();
    let (ts, modifier) = first.split_at(digits);

    let modifier_ok = modifier.is_empty()
        || (modifier.len() > 1
            && modifier.ends_with('_')
            && modifier[..modifier.len() - 1]
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));

    if first.is_empty() || !modifier_ok {
        return Ok(("", "", rest));
    }
    if ts.len() > TIMESTAMP_LEN {
        return Err(ReplayError::InvalidRequest(format!(
            "timestamp {ts:?} exceeds {TIMESTAMP_LEN} digits"
        )));
    }
    debug_assert!(ts.is_empty() || is_timestamp(ts));
    Ok((ts, modifier, remainder))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
