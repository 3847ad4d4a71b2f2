//! # Groundplan Config
//!
//! Unified single-file configuration management for Groundplan.
//! A single `groundplan.yaml` configures stores, the external executor and
//! source fetcher endpoints, and observability settings.

mod loader;

pub use loader::{load_config, ConfigError};

use serde::Deserialize;

/// Top-level configuration schema for Groundplan.
#[derive(Debug, Clone, Deserialize)]
pub struct GroundplanConfig {
    /// Config schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub stores: StoresConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for GroundplanConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            app: AppConfig::default(),
            stores: StoresConfig::default(),
            executor: ExecutorConfig::default(),
            fetcher: FetcherConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub environment: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            environment: default_env(),
        }
    }
}

fn default_app_name() -> String {
    "groundplan".to_string()
}

fn default_env() -> String {
    "development".to_string()
}

/// Backend selection per store
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoresConfig {
    #[serde(default)]
    pub history: StoreSpec,
    #[serde(default)]
    pub artifacts: StoreSpec,
    #[serde(default)]
    pub runs: StoreSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSpec {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub connection_url: Option<String>,
    /// Optional key prefix/namespace used by backend implementations.
    #[serde(default)]
    pub key_prefix: Option<String>,
}

impl Default for StoreSpec {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection_url: None,
            key_prefix: None,
        }
    }
}

fn default_backend() -> String {
    "in_memory".to_string()
}

/// External executor endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_kind")]
    pub kind: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Seconds to wait for a terminal callback before giving a run up for
    /// lost. Zero disables the timeout.
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kind: default_executor_kind(),
            endpoint: None,
            callback_timeout_secs: default_callback_timeout(),
        }
    }
}

fn default_executor_kind() -> String {
    "http".to_string()
}

fn default_callback_timeout() -> u64 {
    3600
}

/// Source fetch service endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetcherConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub traces_enabled: bool,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            traces_enabled: false,
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
