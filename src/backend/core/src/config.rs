//! Configuration management.
//!
//! Values come from an optional file layered under `LUMEN__*` environment
//! variables, e.g. `LUMEN__SERVER__PORT=9000` or
//! `LUMEN__RATE_LIMIT__AUTH__CAPACITY=200`.

use serde::Deserialize;
use std::time::Duration;

use crate::db::RestStoreConfig;
use crate::error::{ErrorCode, LumenError, Result};
use crate::middleware::rate_limit::RateLimitConfig;
use crate::telemetry::{LoggingConfig, MetricsConfig};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LUMEN";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Which data backend to run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process store, for development and tests
    #[default]
    Memory,
    /// PostgREST-style hosted backend
    Rest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL of the hosted backend
    #[serde(default)]
    pub url: Option<String>,

    /// Service key for the hosted backend
    #[serde(default)]
    pub service_key: Option<String>,

    /// Request timeout
    #[serde(default = "default_backend_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            url: None,
            service_key: None,
            timeout: default_backend_timeout(),
        }
    }
}

impl BackendConfig {
    /// Connection settings for the REST backend.
    ///
    /// Fails when `url` or `service_key` is missing.
    pub fn rest_store_config(&self) -> Result<RestStoreConfig> {
        let url = self.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
            LumenError::new(ErrorCode::InvalidConfiguration, "Invalid configuration")
                .with_context("missing", "backend.url")
        })?;
        let service_key = self
            .service_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                LumenError::new(ErrorCode::InvalidConfiguration, "Invalid configuration")
                    .with_context("missing", "backend.service_key")
            })?;

        let mut config = RestStoreConfig::new(url, service_key);
        config.timeout = self.timeout;
        Ok(config)
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 3000 }
fn default_backend_timeout() -> Duration { Duration::from_secs(10) }

impl Config {
    /// Load configuration from the environment, layered over `path` if given.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("rate_limit.trusted_proxy_headers")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(Some(path))
    }
}
