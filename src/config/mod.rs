//! Gateway configuration
//!
//! The process is configured through environment variables (there is
//! no CLI surface beyond start/stop); the same structures also
//! deserialize from TOML, which is what the tests use.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

use dimse::DimseConfig;
use hl7::Hl7Config;

mod env;

pub use env::from_env;

/// Error type for configuration loading and validation
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: String, reason: String },

    #[error("Missing required variable {0}")]
    MissingVar(String),

    #[error("Invalid sink configuration: {0}")]
    InvalidSink(String),

    #[error("Invalid listener configuration: {0}")]
    InvalidListener(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub hl7: Hl7Config,

    #[serde(default)]
    pub dimse: DimseConfig,

    #[serde(default)]
    pub sink: SinkConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Identifier this gateway reports in logs
    #[serde(default = "default_id")]
    pub id: String,

    /// Log level / filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Storage root for received imaging payloads
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Run the clinical-messaging listener
    #[serde(default = "default_true")]
    pub hl7_enabled: bool,

    /// Run the image-transfer listener
    #[serde(default = "default_true")]
    pub dimse_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            log_level: default_log_level(),
            store_dir: default_store_dir(),
            hl7_enabled: true,
            dimse_enabled: true,
        }
    }
}

/// Downstream forwarding sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Full URL of the downstream ingest endpoint
    #[serde(default)]
    pub url: String,

    /// Bearer credential sent with every forward
    #[serde(default)]
    pub token: String,

    /// Request timeout in seconds
    #[serde(default = "default_sink_timeout")]
    pub timeout_secs: u64,

    /// Source tag stamped on every forwarded record
    #[serde(default = "default_source_tag")]
    pub source_tag: String,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            timeout_secs: default_sink_timeout(),
            source_tag: default_source_tag(),
        }
    }
}

impl SinkConfig {
    /// Request timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Parse a TOML document into a configuration
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml)?)
    }

    /// Apply one bind address to both listeners
    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.hl7.bind_addr = addr;
        self.dimse.bind_addr = addr;
        self
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink.url.is_empty() {
            return Err(ConfigError::InvalidSink(
                "sink URL is required".to_string(),
            ));
        }
        if reqwest::Url::parse(&self.sink.url).is_err() {
            return Err(ConfigError::InvalidSink(format!(
                "sink URL '{}' is not a valid URL",
                self.sink.url
            )));
        }
        self.hl7
            .validate()
            .map_err(|e| ConfigError::InvalidListener(e.to_string()))?;
        self.dimse
            .validate()
            .map_err(|e| ConfigError::InvalidListener(e.to_string()))?;
        if self.gateway.store_dir.trim().is_empty() {
            return Err(ConfigError::InvalidListener(
                "store_dir cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_id() -> String {
    "radgate".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_store_dir() -> String {
    "./studies".to_string()
}

fn default_sink_timeout() -> u64 {
    30
}

fn default_source_tag() -> String {
    "radgate".to_string()
}

fn default_true() -> bool {
    true
}
