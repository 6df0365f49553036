//! Application configuration and base endpoint resolution.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use tracing::{debug, info};

/// Environment variable consulted when no endpoint is configured.
pub const API_URL_ENV: &str = "API_URL";
/// Host used when neither configuration nor environment name one.
pub const FALLBACK_API_URL: &str = "https://prestaserv-api-68y8.onrender.com";
/// Prefix for environment overrides of configuration keys.
pub const ENV_PREFIX: &str = "PRESTASERV";

const CONFIG_DIR: &str = "prestaserv";
const CONFIG_FILE: &str = "config.toml";
const SESSION_FILE: &str = "session.json";

const DEFAULT_CONFIG: &str = r#"# PrestaServ client configuration.

# Backend endpoint. Takes precedence over the API_URL environment variable.
# api_url = "https://prestaserv-api-68y8.onrender.com"

# Seconds to wait for a response before giving up.
request_timeout_secs = 30
"#;

static BASE_URL: OnceCell<String> = OnceCell::new();

/// Runtime configuration for the client.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Explicitly configured backend endpoint.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Directory holding the persisted session and logs.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Per-request timeout.
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            data_dir: default_data_dir(),
            request_timeout_secs: default_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default config file plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load configuration from `path` (optional) plus `PRESTASERV_*` overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading configuration");
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        settings
            .try_deserialize()
            .with_context(|| format!("failed to parse configuration {}", path.display()))
    }

    /// Backend endpoint for this process.
    ///
    /// Resolved on first call and reused afterwards, so later changes to the
    /// configuration or environment do not move a running client.
    pub fn base_url(&self) -> &'static str {
        BASE_URL
            .get_or_init(|| {
                let environment = env::var(API_URL_ENV).ok();
                let resolved = resolve_base_url(self.api_url.as_deref(), environment.as_deref());
                info!(base_url = %resolved, "resolved API endpoint");
                resolved
            })
            .as_str()
    }

    /// Location of the persisted session document.
    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join(SESSION_FILE)
    }

    /// Directory for log files.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Pick the endpoint by precedence: configured value, then environment, then
/// the fallback host. Blank values are skipped.
pub fn resolve_base_url(configured: Option<&str>, environment: Option<&str>) -> String {
    [configured, environment]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(FALLBACK_API_URL)
        .trim_end_matches('/')
        .to_string()
}

/// Default configuration file under the user's config directory.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
        .join(CONFIG_FILE)
}

/// Write a commented default configuration file if none exists yet.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())
}

fn write_default_config(path: PathBuf) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "wrote default configuration");
    Ok(())
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR)
}

fn default_timeout() -> u64 {
    30
}
