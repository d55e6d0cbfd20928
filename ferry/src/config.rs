//! # Configuration
//!
//! `ferry` reads an optional TOML file. Every field has a default, so an empty
//! file, or no file at all, gives a working configuration.
//!
//! ```toml
//! [download]
//! max_attempts = 5
//! base_delay_ms = 500
//! max_delay_ms = 30000
//! backoff_factor = 2.0
//! jitter = true
//! request_timeout_secs = 20
//! concurrency = 4
//! session_ttl_secs = 1200
//!
//! [limits.sandbox-exec]
//! max_files = 20
//! max_file_bytes = 536870912
//!
//! [transport]
//! base_url = "https://api.openai.com/v1"
//! primary_path = "/files/{artifact_id}/content"
//! fallback_path = "/containers/{session_id}/files/{artifact_id}/content"
//! token_env = "OPENAI_API_KEY"
//! ```
//!
//! An empty `fallback_path` disables the fallback tier.
//!
//! Without `--config`, the file is looked up as `ferry.toml` in the user
//! configuration directory.

use crate::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_BASE_DELAY, DEFAULT_BASE_URL, DEFAULT_DOWNLOAD_CONCURRENCY,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SESSION_TTL,
    DEFAULT_TOKEN_ENV,
};
use crate::download::DownloadPolicy;
use crate::retry::RetryConfig;
use crate::router::RoutingLimits;
use directories::ProjectDirs;
use ferry_http_client::client::{CONTAINER_ENDPOINT_PATH, FILES_ENDPOINT_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "ferry.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FerryConfig {
    #[serde(default)]
    pub download: DownloadSettings,
    #[serde(default)]
    pub limits: RoutingLimits,
    #[serde(default)]
    pub transport: TransportSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub jitter: bool,
    pub request_timeout_secs: u64,
    pub concurrency: usize,
    /// Lifetime assumed for sessions whose manifest entry carries none.
    pub session_ttl_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY.as_millis() as u64,
            max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            jitter: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            session_ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
        }
    }
}

impl DownloadSettings {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn to_policy(&self) -> DownloadPolicy {
        DownloadPolicy {
            max_attempts: self.max_attempts,
            backoff: RetryConfig::default()
                .with_initial_delay(Duration::from_millis(self.base_delay_ms))
                .with_max_delay(Duration::from_millis(self.max_delay_ms))
                .with_backoff_factor(self.backoff_factor)
                .with_jitter(self.jitter),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TransportSettings {
    pub base_url: String,
    pub primary_path: String,
    pub fallback_path: String,
    /// Environment variable holding the bearer credential.
    pub token_env: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            primary_path: FILES_ENDPOINT_PATH.to_string(),
            fallback_path: CONTAINER_ENDPOINT_PATH.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

impl TransportSettings {
    pub fn has_fallback(&self) -> bool {
        !self.fallback_path.trim().is_empty()
    }
}

impl FerryConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: FerryConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.download;
        if d.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "download.max_attempts must be at least 1".into(),
            ));
        }
        if d.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "download.concurrency must be at least 1".into(),
            ));
        }
        if d.backoff_factor.is_nan() || d.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "download.backoff_factor must be >= 1.0, got {}",
                d.backoff_factor
            )));
        }
        if d.base_delay_ms > d.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "download.base_delay_ms ({}) exceeds download.max_delay_ms ({})",
                d.base_delay_ms, d.max_delay_ms
            )));
        }
        if d.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "download.request_timeout_secs must be at least 1".into(),
            ));
        }
        if d.request_timeout_secs.saturating_mul(1000) >= d.max_delay_ms {
            return Err(ConfigError::Invalid(format!(
                "download.request_timeout_secs ({}s) must be shorter than download.max_delay_ms ({}ms)",
                d.request_timeout_secs, d.max_delay_ms
            )));
        }

        let t = &self.transport;
        if !t.primary_path.contains("{artifact_id}") {
            return Err(ConfigError::Invalid(format!(
                "transport.primary_path '{}' has no {{artifact_id}} placeholder",
                t.primary_path
            )));
        }
        if t.has_fallback() && !t.fallback_path.contains("{artifact_id}") {
            return Err(ConfigError::Invalid(format!(
                "transport.fallback_path '{}' has no {{artifact_id}} placeholder",
                t.fallback_path
            )));
        }
        if t.token_env.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "transport.token_env must name an environment variable".into(),
            ));
        }
        Ok(())
    }
}

/// Default config file location, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("dev", "Ferry", "ferry").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load configuration.
///
/// An explicit `path` must exist. Without one, the default location is tried
/// and a missing file yields the defaults.
pub async fn load_config(path: Option<&Path>) -> Result<FerryConfig, ConfigError> {
    let (path, required) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => match default_config_path() {
            Some(p) => (p, false),
            None => return Ok(FerryConfig::default()),
        },
    };

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            debug!("Loading configuration from {}", path.display());
            FerryConfig::from_toml_str(&contents, &path)
        }
        Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No configuration at {}; using defaults", path.display());
            Ok(FerryConfig::default())
        }
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}
