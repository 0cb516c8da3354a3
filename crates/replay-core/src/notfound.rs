//! # Not-Found Synthesis
//!
//! Builds the response served when no store has an exchange for a request.
//! The body is negotiated from the request's destination so a missing
//! script yields a harmless JS comment, a missing stylesheet a CSS comment,
//! a `fetch()` a JSON error, and a page load an HTML page:
//!
//! | destination                                   | content type        |
//! |-----------------------------------------------|---------------------|
//! | `json`, empty                                 | `application/json`  |
//! | `script`                                      | `text/javascript`   |
//! | `style`                                       | `text/css`          |
//! | `document`, `embed`, `iframe`, `frame`, other | `text/html`         |
//!
//! The HTML page navigates to the redirect-resolution endpoint when it is
//! the top-level document, and only posts an `archive-not-found` message to
//! its parent when framed; a frame never navigates the outer page.
//!
//! Every response carries `Content-Type`, a `Content-Length` equal to the
//! encoded body length, and [`REPLAY_CSP`]. The status line uses the
//! status code's canonical reason phrase.

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_SECURITY_POLICY, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};
use serde::Serialize;

use crate::exchange::ReplayResponse;
use crate::request::Destination;
use crate::REPLAY_CSP;

/// Inputs for a destination-negotiated not-found response.
#[derive(Debug, Clone)]
pub struct NotFoundQuery<'a> {
    pub destination: &'a Destination,
    /// Canonical URL that was requested.
    pub url: &'a str,
    /// Requested timestamp (may be empty).
    pub timestamp: &'a str,
    /// Collection the request was addressed to, used by the "try live"
    /// redirect.
    pub coll: &'a str,
    pub message: Option<&'a str>,
    pub status: StatusCode,
}

/// Not-found response for `url` with no timestamp or collection context.
pub fn not_found(
    destination: &Destination,
    url: &str,
    message: Option<&str>,
    status: StatusCode,
) -> ReplayResponse {
    not_found_by_type(&NotFoundQuery {
        destination,
        url,
        timestamp: "",
        coll: "",
        message,
        status,
    })
}

/// Not-found response negotiated by the request destination.
pub fn not_found_by_type(query: &NotFoundQuery<'_>) -> ReplayResponse {
    let (content, content_type) = match query.destination {
        Destination::Json | Destination::Empty => (
            json_not_found(query.url, query.timestamp, query.message),
            "application/json; charset=utf-8",
        ),
        Destination::Script => (
            script_css_not_found("Script", query.url, query.timestamp, query.message),
            "text/javascript; charset=utf-8",
        ),
        Destination::Style => (
            script_css_not_found("CSS", query.url, query.timestamp, query.message),
            "text/css; charset=utf-8",
        ),
        _ => (html_not_found(query), "text/html; charset=utf-8"),
    };
    text_response(content, content_type, query.status)
}

/// Error page for a live-proxy fetch that failed with `status`.
///
/// Reports `live-proxy-url-error` and shows a "go back" link only when the
/// page is not inside a replay frame.
pub fn proxy_not_found(url: &str, status: StatusCode) -> ReplayResponse {
    text_response(proxy_error_html(url, status), "text/html", status)
}

/// Build a text response with exact `Content-Length` and the replay CSP.
pub fn text_response(content: String, content_type: &'static str, status: StatusCode) -> ReplayResponse {
    let body = Bytes::from(content);
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    let len = response.body().len();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(CONTENT_SECURITY_POLICY, HeaderValue::from_static(REPLAY_CSP));
    response
}

#[derive(Serialize)]
struct JsonNotFound<'a> {
    error: &'a str,
    #[serde(rename = "URL")]
    url: &'a str,
    #[serde(rename = "TS")]
    ts: &'a str,
}

fn json_not_found(url: &str, ts: &str, message: Option<&str>) -> String {
    let body = JsonNotFound {
        error: message.unwrap_or("not_found"),
        url,
        ts,
    };
    serde_json::to_string(&body).unwrap_or_else(|_| String::from("{\"error\":\"not_found\"}"))
}

fn script_css_not_found(kind: &str, url: &str, ts: &str, message: Option<&str>) -> String {
    let heading = match message {
        Some(msg) => msg.to_string(),
        None => format!("{kind} Not Found"),
    };
    format!(
        "/*\n   {}\n   URL: {}\n   TS: {}\n*/\n",
        comment_safe(&heading),
        comment_safe(url),
        comment_safe(ts)
    )
}

fn html_not_found(query: &NotFoundQuery<'_>) -> String {
    let heading = query.message.unwrap_or("Not in the archive");
    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Not Found</title>
</head>
<body style="font-family: sans-serif">
<h2>{heading}</h2>
<p><code style="word-break: break-all">{url_html}</code></p>
<p>This page or resource was not captured in this archive.</p>
<p><a href="{url_html}" target="_blank" rel="noopener">View the live version</a></p>
<script>
(function() {{
  var url = {url_js};
  var ts = {ts_js};
  var coll = {coll_js};
  var inIframe = window.self !== window.top;
  if (!inIframe) {{
    window.location.href = window.location.origin + "/?action=redirect&coll=" +
      encodeURIComponent(coll) + "&url=" + encodeURIComponent(url) +
      "&timestamp=" + encodeURIComponent(ts);
  }} else {{
    window.parent.postMessage({{wb_type: "archive-not-found", url: url, ts: ts}}, "*");
  }}
}})();
</script>
</body>
</html>
"#,
        heading = html_escape(heading),
        url_html = html_escape(query.url),
        url_js = js_string(query.url),
        ts_js = js_string(query.timestamp),
        coll_js = js_string(query.coll),
    )
}

fn proxy_error_html(url: &str, status: StatusCode) -> String {
    format!(
        r##"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<script>
window.requestURL = {url_js};
</script>
</head>
<body style="font-family: sans-serif">
<h2>Live page could not be loaded</h2>
<p>This page could not be loaded through the live proxy. Check the URL and try again.</p>
<p><code id="url" style="word-break: break-all; font-size: larger">Status Code: {status}</code></p>
<p id="goback" style="display: none"><a href="#" onclick="window.history.back()">Go Back</a> to the previous page.</p>
<script>
var isTop = true;
try {{
  if (window.parent._WB_wombat_location) {{
    isTop = false;
  }}
}} catch (e) {{
}}
if (isTop) {{
  document.querySelector("#goback").style.display = "";
  window.parent.postMessage({{
    wb_type: "live-proxy-url-error",
    url: window.requestURL,
    status: {status},
  }}, "*");
}}
</script>
</body>
</html>
"##,
        url_js = js_string(url),
        status = status.as_u16(),
    )
}

/// Escape text for HTML element content and quoted attributes.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A JS string literal safe to embed inside a `<script>` element.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s)
        .unwrap_or_else(|_| String::from("\"\""))
        .replace('<', "\\u003c")
}

fn comment_safe(s: &str) -> String {
    s.replace("*/", "*\\/")
}
