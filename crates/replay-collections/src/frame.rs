//! # Frame Assembly
//!
//! Builds the pages the replay frame needs around archived content: the
//! enclosing top frame, the head insert carrying replay state into each
//! archived document, and the module declaration shim for module scripts.

use chrono::{DateTime, Utc};
use http::header::{HeaderValue, CONTENT_LENGTH, LOCATION};
use http::StatusCode;
use replay_core::notfound::{html_escape, js_string, text_response};
use replay_core::ReplayResponse;
use serde_json::json;

/// Path (relative to a collection prefix) of the module declaration shim.
pub const WRAPPED_MODULE_DECL: &str = "__wb_module_decl.js";

const MODULE_DECL_JS: &str = r#"
var wrapObj = function(name) {return (self._wb_wombat && self._wb_wombat.local_init && self._wb_wombat.local_init(name)) || self[name]; };
if (!self.__WB_pmw) { self.__WB_pmw = function(obj) { this.__WB_source = obj; return this; } }

const window = wrapObj("window");
const document = wrapObj("document");
const location = wrapObj("location");
const top = wrapObj("top");
const parent = wrapObj("parent");
const frames = wrapObj("frames");
const opener = wrapObj("opener");
const __self = wrapObj("self");
const __globalThis = wrapObj("globalThis");

export { window, document, location, top, parent, frames, opener, __self as self, __globalThis as globalThis };
"#;

pub fn wrapped_module_decl() -> ReplayResponse {
    text_response(
        MODULE_DECL_JS.to_string(),
        "application/javascript",
        StatusCode::OK,
    )
}

/// Empty-bodied redirect to `location`.
pub fn redirect(location: &str, status: StatusCode) -> ReplayResponse {
    let mut response = http::Response::new(bytes::Bytes::new());
    match HeaderValue::from_str(location) {
        Ok(v) => {
            *response.status_mut() = status;
            response.headers_mut().insert(LOCATION, v);
        }
        Err(_) => {
            tracing::warn!(location, "unencodable redirect location");
            *response.status_mut() = StatusCode::BAD_REQUEST;
        }
    }
    response
        .headers_mut()
        .insert(CONTENT_LENGTH, HeaderValue::from_static("0"));
    response
}

/// Inputs of the enclosing top-frame page.
#[derive(Debug, Clone)]
pub struct TopFrame<'a> {
    pub url: &'a str,
    pub timestamp: &'a str,
    pub coll: &'a str,
    /// Prefix the iframe loads replay content through.
    pub frame_prefix: &'a str,
    pub static_prefix: &'a str,
    pub base_frame_url: Option<&'a str>,
    pub base_frame_hash_replay: bool,
}

/// Top-frame response: a redirect to an external base frame when one is
/// configured, otherwise a page embedding the resource in an iframe.
pub fn make_top_frame(frame: &TopFrame<'_>) -> ReplayResponse {
    if let Some(base) = frame.base_frame_url {
        let hash = if frame.base_frame_hash_replay {
            format!("{}/{}", frame.timestamp, frame.url)
        } else {
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("url", frame.url)
                .append_pair("ts", frame.timestamp)
                .append_pair("view", "replay")
                .finish()
        };
        return redirect(&format!("{base}#{hash}"), StatusCode::FOUND);
    }

    let src = format!("{}{}mp_/{}", frame.frame_prefix, frame.timestamp, frame.url);
    let content = format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<style>
html, body {{ height: 100%; margin: 0; padding: 0; overflow: hidden; }}
iframe {{ width: 100%; height: 100%; border: 0; }}
</style>
<title>{title}</title>
<script>
window.home = {static_prefix};
window.addEventListener("message", function(event) {{
  if (event.data && event.data.wb_type === "load" && event.data.title) {{
    document.title = event.data.title;
  }}
}});
</script>
</head>
<body>
<iframe id="___wb_replay_top_frame" name="___wb_replay_top_frame" src="{src}" allow="autoplay; fullscreen" data-coll="{coll}"></iframe>
</body>
</html>
"#,
        title = html_escape(frame.url),
        static_prefix = js_string(frame.static_prefix),
        src = html_escape(&src),
        coll = html_escape(frame.coll),
    );
    text_response(content, "text/html; charset=utf-8", StatusCode::OK)
}

/// Replay state carried into an archived HTML document.
#[derive(Debug, Clone)]
pub struct HeadInsert<'a> {
    pub url: &'a str,
    /// Timestamp of the capture being served.
    pub timestamp: &'a str,
    /// Timestamp the client asked for.
    pub request_ts: &'a str,
    pub date: DateTime<Utc>,
    pub top_url: &'a str,
    pub prefix: &'a str,
    pub static_prefix: &'a str,
    pub coll: &'a str,
    pub preset_cookie: &'a str,
    pub set_cookie: Option<&'a str>,
    pub is_live: bool,
    pub referrer: &'a str,
    pub convert_post_to_get: bool,
    pub inject_scripts: &'a [String],
    pub inject_rel_canon: bool,
}

/// `wbinfo` script block plus the client-side rewriter and any injected
/// scripts.
pub fn make_head_insert(insert: &HeadInsert<'_>) -> String {
    let (scheme, host) = match url::Url::parse(insert.url) {
        Ok(u) => (
            u.scheme().to_string(),
            u.host_str()
                .map(|h| match u.port() {
                    Some(p) => format!("{h}:{p}"),
                    None => h.to_string(),
                })
                .unwrap_or_default(),
        ),
        Err(_) => ("http".to_string(), String::new()),
    };

    let wbinfo = json!({
        "url": insert.url,
        "timestamp": insert.timestamp,
        "request_ts": insert.request_ts,
        "prefix": insert.prefix,
        "mod": "mp_",
        "is_framed": false,
        "is_live": insert.is_live,
        "coll": insert.coll,
        "proxy_magic": "",
        "static_prefix": insert.static_prefix,
        "wombat_ts": insert.timestamp,
        "wombat_sec": insert.date.timestamp(),
        "wombat_scheme": scheme,
        "wombat_host": host,
        "wombat_opts": {},
        "top_url": insert.top_url,
        "presetCookie": insert.preset_cookie,
        "setCookie": insert.set_cookie,
        "referrer": insert.referrer,
        "convert_post_to_get": insert.convert_post_to_get,
    });
    // `<` never appears raw so the block cannot close its own script tag.
    let wbinfo = wbinfo.to_string().replace('<', "\\u003c");

    let mut out = String::from("\n<!-- WB Insert -->\n");
    out.push_str(&format!(
        "<script>\nwbinfo = {wbinfo};\nif (window && window.top !== window && !window.__WB_replay_top) {{ window.__WB_replay_top = window.top; }}\n</script>\n"
    ));
    out.push_str(&format!(
        "<script src=\"{}wombat.js\"></script>\n",
        html_escape(insert.static_prefix)
    ));
    out.push_str(
        "<script>\nwbinfo.wombat_opts = {};\nif (window._WBWombatInit) { window._WBWombatInit(wbinfo); }\n</script>\n",
    );
    for script in insert.inject_scripts {
        out.push_str(&format!(
            "<script src=\"{}\"></script>\n",
            html_escape(script)
        ));
    }
    if insert.inject_rel_canon {
        out.push_str(&format!(
            "<link rel=\"canonical\" href=\"{}\"/>\n",
            html_escape(insert.url)
        ));
    }
    out.push_str("<!-- End WB Insert -->\n");
    out
}
