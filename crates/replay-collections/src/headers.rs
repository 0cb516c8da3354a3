//! Response header policy for replayed exchanges.

use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use replay_core::temporal::http_date;
use replay_core::REPLAY_CSP;

/// Headers that break framed replay or pin the archived origin's policy.
const FRAMING_UNSAFE: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
    "strict-transport-security",
    "clear-site-data",
    "public-key-pins",
    "alt-svc",
    "cross-origin-opener-policy",
    "cross-origin-embedder-policy",
    "transfer-encoding",
];

pub const MEMENTO_DATETIME: &str = "memento-datetime";

/// Remove framing-unsafe headers plus any listed in `extra`.
pub fn strip_unsafe(headers: &mut HeaderMap, extra: &[String]) {
    for name in FRAMING_UNSAFE {
        headers.remove(*name);
    }
    for name in extra {
        if let Ok(name) = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()) {
            headers.remove(name);
        }
    }
}

pub fn add_cross_origin_isolation(headers: &mut HeaderMap) {
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-embedder-policy"),
        HeaderValue::from_static("require-corp"),
    );
}

/// Substitute the collection CSP, or the engine default when unset.
pub fn set_csp(headers: &mut HeaderMap, csp: &str) {
    let value = if csp.is_empty() {
        HeaderValue::from_static(REPLAY_CSP)
    } else {
        match HeaderValue::from_str(csp) {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(csp, "invalid collection csp, using default");
                HeaderValue::from_static(REPLAY_CSP)
            }
        }
    };
    headers.insert(header::CONTENT_SECURITY_POLICY, value);
}

/// Scope every `Set-Cookie` to the collection prefix: `Domain` is dropped
/// and `Path` becomes `prefix`. Returns the rewritten cookies joined with
/// `,` for the head insert, or `None` when there were none.
pub fn rewrite_set_cookies(headers: &mut HeaderMap, prefix: &str) -> Option<String> {
    let cookies: Vec<String> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(|c| scope_cookie(c, prefix))
        .collect();
    if cookies.is_empty() {
        return None;
    }
    headers.remove(header::SET_COOKIE);
    for cookie in &cookies {
        if let Ok(v) = HeaderValue::from_str(cookie) {
            headers.append(header::SET_COOKIE, v);
        }
    }
    Some(cookies.join(","))
}

fn scope_cookie(cookie: &str, prefix: &str) -> String {
    let mut segments = cookie.split(';').map(str::trim);
    // The first segment is the cookie's own `name=value`, never an attribute.
    let mut parts: Vec<String> = segments.next().map(str::to_string).into_iter().collect();
    parts.extend(
        segments
            .filter(|attr| {
                let key = attr.split('=').next().unwrap_or("").trim().to_ascii_lowercase();
                key != "domain" && key != "path"
            })
            .map(str::to_string),
    );
    parts.push(format!("Path={prefix}"));
    parts.join("; ")
}

/// Map a redirect `Location` back into the replay namespace.
pub fn rewrite_location(
    headers: &mut HeaderMap,
    base_url: &str,
    prefix: &str,
    timestamp: &str,
    modifier: &str,
) {
    let Some(location) = headers.get(header::LOCATION).and_then(|v| v.to_str().ok()) else {
        return;
    };
    let Ok(base) = url::Url::parse(base_url) else {
        return;
    };
    let Ok(target) = base.join(location) else {
        return;
    };
    let rewritten = format!("{prefix}{timestamp}{modifier}/{target}");
    if let Ok(v) = HeaderValue::from_str(&rewritten) {
        headers.insert(header::LOCATION, v);
    }
}

pub fn add_memento_datetime(headers: &mut HeaderMap, date: &DateTime<Utc>) {
    if let Ok(v) = HeaderValue::from_str(&http_date(date)) {
        headers.insert(HeaderName::from_static(MEMENTO_DATETIME), v);
    }
}
