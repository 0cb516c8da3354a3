//! # Collection Replay Policy
//!
//! `CollConfig` is stored as raw JSON in each collection record and merged
//! over the registry's default config (shallow: record keys win).

use std::collections::BTreeMap;

use http::{HeaderMap, HeaderName, HeaderValue};
use replay_core::ReplayError;
use replay_live::LiveProxyConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// URL namespaces the engine serves from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefixes {
    /// Engine static assets, e.g. `/static/`.
    pub static_prefix: String,
    /// Prefix of the root collection, e.g. `/`.
    pub root: String,
    /// Replay prefix; collection `name` lives at `{main}{name}/`.
    pub main: String,
}

impl Default for Prefixes {
    fn default() -> Self {
        Self {
            static_prefix: "/static/".into(),
            root: "/".into(),
            main: "/w/".into(),
        }
    }
}

/// Replay policy for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollConfig {
    /// Response headers stripped in addition to the framing-unsafe defaults.
    pub strip_headers: Vec<String>,
    /// Tell the client-side rewriter to turn POST submissions into GETs.
    pub convert_post_to_get: bool,
    /// Disable server-side POST→GET lookup conversion.
    pub no_post_to_get: bool,
    /// Add cross-origin-isolation headers to replayed responses.
    pub co_headers: bool,
    /// Content-Security-Policy substituted on replayed responses.
    pub csp: String,
    /// Emit `<link rel="canonical">` with the original URL.
    pub inject_rel_canon: bool,
    /// Extra scripts loaded by the head insert.
    pub inject_scripts: Vec<String>,
    /// URL prefixes served without content rewriting.
    pub no_rewrite_prefixes: Vec<String>,
    /// Redirect non-canonical request URLs.
    pub canon_redirect: bool,
    /// Serve the enclosing frame page for modifier-less requests.
    pub top_frame: bool,
    /// External page hosting the replay frame.
    pub base_frame_url: Option<String>,
    /// Prefix the top frame's iframe loads through. Defaults to the
    /// collection prefix.
    pub base_frame_prefix: Option<String>,
    /// Pass `ts/url` to `base_frame_url` as a bare hash.
    pub base_frame_hash_replay: bool,
    /// Fall back to the live web when the archive has no capture.
    pub live_redirect_on_not_found: bool,
    /// Live fallback (and live collection) settings.
    pub live_proxy: LiveProxyConfig,
    /// Auth headers sent by the store upstream.
    pub headers: BTreeMap<String, String>,
    /// Cookie string seeded into the replayed page.
    pub preset_cookie: Option<String>,
}

impl Default for CollConfig {
    fn default() -> Self {
        Self {
            strip_headers: Vec::new(),
            convert_post_to_get: false,
            no_post_to_get: false,
            co_headers: false,
            csp: String::new(),
            inject_rel_canon: false,
            inject_scripts: Vec::new(),
            no_rewrite_prefixes: Vec::new(),
            canon_redirect: true,
            top_frame: true,
            base_frame_url: None,
            base_frame_prefix: None,
            base_frame_hash_replay: false,
            live_redirect_on_not_found: false,
            live_proxy: LiveProxyConfig::default(),
            headers: BTreeMap::new(),
            preset_cookie: None,
        }
    }
}

impl CollConfig {
    /// Merge `config` over `defaults` and deserialize.
    pub fn from_values(defaults: &Value, config: &Value) -> Result<Self, ReplayError> {
        let merged = merge_shallow(defaults, config);
        serde_json::from_value(merged)
            .map_err(|e| ReplayError::Store(format!("invalid collection config: {e}")))
    }

    /// Auth headers as a header map. Invalid names or values are skipped.
    pub fn header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in &self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    map.insert(n, v);
                }
                _ => tracing::warn!(header = %name, "skipping invalid auth header"),
            }
        }
        map
    }

    pub fn is_no_rewrite(&self, url: &str) -> bool {
        self.no_rewrite_prefixes.iter().any(|p| url.starts_with(p.as_str()))
    }
}

fn merge_shallow(defaults: &Value, config: &Value) -> Value {
    match (defaults, config) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (k, v) in over {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base.clone(),
        (_, over) => over.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_keys_override_defaults() {
        let defaults = json!({"csp": "default-src 'self'", "co_headers": true});
        let config = json!({"co_headers": false, "inject_scripts": ["/static/ruffle.js"]});
        let cfg = CollConfig::from_values(&defaults, &config).unwrap();
        assert_eq!(cfg.csp, "default-src 'self'");
        assert!(!cfg.co_headers);
        assert_eq!(cfg.inject_scripts, vec!["/static/ruffle.js".to_string()]);
        assert!(cfg.canon_redirect);
    }

    #[test]
    fn null_config_uses_defaults() {
        let cfg = CollConfig::from_values(&json!({}), &Value::Null).unwrap();
        assert_eq!(cfg, CollConfig::default());
    }

    #[test]
    fn malformed_config_is_an_error() {
        let err = CollConfig::from_values(&json!({}), &json!({"co_headers": "yes"}));
        assert!(err.is_err());
    }

    #[test]
    fn header_map_skips_invalid() {
        let mut cfg = CollConfig::default();
        cfg.headers.insert("authorization".into(), "Bearer t".into());
        cfg.headers.insert("bad header".into(), "x".into());
        let map = cfg.header_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["authorization"], "Bearer t");
    }
}
