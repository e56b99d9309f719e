//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Deserialize)]
pub struct EventStreamConfig {
    #[serde(default = "default_stream_url")]
    pub url: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Capacity of the outbound frame queue while connected
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
    /// Host-specific event types accepted in addition to the built-in set
    #[serde(default)]
    pub extension_types: Vec<String>,
}

fn default_stream_url() -> String {
    "ws://localhost:4000/ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_outbound_buffer() -> usize {
    64
}

impl Default for EventStreamConfig {
    fn default() -> Self {
        Self {
            url: default_stream_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            outbound_buffer: default_outbound_buffer(),
            extension_types: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
    #[serde(default = "default_sign_in")]
    pub sign_in: String,
    #[serde(default = "default_auth_only")]
    pub auth_only: Vec<String>,
    #[serde(default = "default_public")]
    pub public: Vec<String>,
    #[serde(default = "default_kid_prefix")]
    pub kid_prefix: String,
    #[serde(default = "default_parent_prefix")]
    pub parent_prefix: String,
    #[serde(default = "default_kid_prefix")]
    pub kid_home: String,
    #[serde(default = "default_parent_prefix")]
    pub parent_home: String,
    #[serde(default = "default_callback_param")]
    pub callback_param: String,
}

fn default_sign_in() -> String {
    "/auth/signin".to_string()
}

fn default_auth_only() -> Vec<String> {
    vec!["/auth/signin".to_string(), "/auth/signup".to_string()]
}

fn default_public() -> Vec<String> {
    vec![
        "/".to_string(),
        "/auth/signin".to_string(),
        "/auth/signup".to_string(),
        "/offline".to_string(),
    ]
}

fn default_kid_prefix() -> String {
    "/dashboard/kids".to_string()
}

fn default_parent_prefix() -> String {
    "/dashboard/parents".to_string()
}

fn default_callback_param() -> String {
    "callbackUrl".to_string()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            sign_in: default_sign_in(),
            auth_only: default_auth_only(),
            public: default_public(),
            kid_prefix: default_kid_prefix(),
            parent_prefix: default_parent_prefix(),
            kid_home: default_kid_prefix(),
            parent_home: default_parent_prefix(),
            callback_param: default_callback_param(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub event_stream: EventStreamConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    stream_url: String,
    reconnect_delay_ms: u64,
    connect_timeout_ms: u64,
    outbound_buffer: usize,
    extension_types: Vec<String>,
    sign_in_path: String,
    auth_only_paths: Vec<String>,
    public_paths: Vec<String>,
    kid_prefix: String,
    parent_prefix: String,
    kid_home: String,
    parent_home: String,
    callback_param: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let TomlConfig { event_stream, routes, metrics } = toml_config;
        Self {
            stream_url: event_stream.url,
            reconnect_delay_ms: event_stream.reconnect_delay_ms,
            connect_timeout_ms: event_stream.connect_timeout_ms,
            // A zero-capacity mpsc channel panics on creation
            outbound_buffer: event_stream.outbound_buffer.max(1),
            extension_types: event_stream.extension_types,
            sign_in_path: routes.sign_in,
            auth_only_paths: routes.auth_only,
            public_paths: routes.public,
            kid_prefix: routes.kid_prefix,
            parent_prefix: routes.parent_prefix,
            kid_home: routes.kid_home,
            parent_home: routes.parent_home,
            callback_param: routes.callback_param,
            metrics_interval_secs: metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn reconnect_delay_ms(&self) -> u64 {
        self.reconnect_delay_ms
    }

    pub fn connect_timeout_ms(&self) -> u64 {
        self.connect_timeout_ms
    }

    pub fn outbound_buffer(&self) -> usize {
        self.outbound_buffer
    }

    pub fn extension_types(&self) -> &[String] {
        &self.extension_types
    }

    pub fn sign_in_path(&self) -> &str {
        &self.sign_in_path
    }

    pub fn auth_only_paths(&self) -> &[String] {
        &self.auth_only_paths
    }

    pub fn public_paths(&self) -> &[String] {
        &self.public_paths
    }

    pub fn kid_prefix(&self) -> &str {
        &self.kid_prefix
    }

    pub fn parent_prefix(&self) -> &str {
        &self.parent_prefix
    }

    pub fn kid_home(&self) -> &str {
        &self.kid_home
    }

    pub fn parent_home(&self) -> &str {
        &self.parent_home
    }

    pub fn callback_param(&self) -> &str {
        &self.callback_param
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }
}
