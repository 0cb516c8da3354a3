//! Process configuration: command-line flags with environment fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use replay_collections::Prefixes;

/// replay-server: serve web archive collections over HTTP.
#[derive(Parser, Debug, Clone)]
#[command(name = "replay-server", version, about)]
pub struct ServerArgs {
    #[arg(long, env = "REPLAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Postgres URL of the collection-metadata store. Records are kept in
    /// memory when absent.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "REPLAY_PREFIX", default_value = "/w/")]
    pub replay_prefix: String,

    #[arg(long, env = "REPLAY_STATIC_PREFIX", default_value = "/static/")]
    pub static_prefix: String,

    #[arg(long, env = "REPLAY_API_PREFIX", default_value = "/api/")]
    pub api_prefix: String,

    /// Directory served under the static prefix (wombat.js and friends).
    #[arg(long, env = "REPLAY_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// How long a replay request waits for the initial collection load.
    #[arg(long, env = "REPLAY_INIT_TIMEOUT_MS", default_value_t = 5000)]
    pub init_timeout_ms: u64,

    /// Collection served at the root prefix instead of under its name.
    #[arg(long, env = "REPLAY_ROOT_COLL")]
    pub root_coll: Option<String>,

    /// JSON object merged under every collection's own config.
    #[arg(long, env = "REPLAY_DEFAULT_CONFIG")]
    pub default_config: Option<String>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl ServerArgs {
    pub fn app_config(&self) -> AppConfig {
        AppConfig {
            replay_prefix: with_slashes(&self.replay_prefix),
            static_prefix: with_slashes(&self.static_prefix),
            api_prefix: with_slashes(&self.api_prefix),
            static_dir: self.static_dir.clone(),
            init_timeout: Duration::from_millis(self.init_timeout_ms),
        }
    }

    /// Parsed `--default-config`, or an empty object.
    pub fn default_config(&self) -> Result<serde_json::Value, serde_json::Error> {
        match &self.default_config {
            Some(raw) => serde_json::from_str(raw),
            None => Ok(serde_json::Value::Object(Default::default())),
        }
    }
}

/// Router configuration derived from [`ServerArgs`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub replay_prefix: String,
    pub static_prefix: String,
    pub api_prefix: String,
    pub static_dir: Option<PathBuf>,
    pub init_timeout: Duration,
}

impl AppConfig {
    /// Collection URL namespaces matching this router.
    pub fn prefixes(&self) -> Prefixes {
        Prefixes {
            static_prefix: self.static_prefix.clone(),
            root: "/".to_string(),
            main: self.replay_prefix.clone(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            replay_prefix: "/w/".to_string(),
            static_prefix: "/static/".to_string(),
            api_prefix: "/api/".to_string(),
            static_dir: None,
            init_timeout: Duration::from_millis(5000),
        }
    }
}

/// Normalize a prefix to `/segment/`.
fn with_slashes(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
