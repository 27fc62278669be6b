//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the development server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Dashboard resources and self-reload mode.
    pub dashboard: DashboardConfig,

    /// Filesystem watch tuning.
    pub watch: WatchConfig,

    /// Long-poll change endpoint settings.
    pub changes: ChangesConfig,

    /// Project API settings.
    pub api: ApiConfig,

    /// Proxy mode upstream settings.
    pub proxy: ProxyConfig,

    /// Project list persistence.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8088").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8088".to_string(),
        }
    }
}

/// Dashboard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Directory served under `/_/`.
    pub resource_dir: PathBuf,

    /// Watch the dashboard's own resources so the dashboard live reloads too.
    pub dev_mode: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            resource_dir: PathBuf::from("dashboard"),
            dev_mode: false,
        }
    }
}

/// Watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period used to coalesce bursts of filesystem events, in milliseconds.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 150 }
    }
}

/// Change endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChangesConfig {
    /// Longest time a change-wait request is held open, in seconds.
    pub wait_timeout_secs: u64,
}

impl Default for ChangesConfig {
    fn default() -> Self {
        Self {
            wait_timeout_secs: 60,
        }
    }
}

/// Project API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Request timeout for API calls, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
        }
    }
}

/// Proxy mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5,
        }
    }
}

/// Project list persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Location of the project list. Defaults to the user config directory.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the effective store location.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("devserve")
                .join("projects.json"),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
