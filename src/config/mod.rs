//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`NOTIFIER_*`)
//!
//! All values have defaults, so an absent config file yields a usable
//! configuration pointing at the default site.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{NotifierError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Site identity and URLs
    #[serde(default)]
    pub site: SiteConfig,

    /// Command-link connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Reconnect policy tuning
    #[serde(default)]
    pub retry: RetryConfig,

    /// Self-update settings
    #[serde(default)]
    pub update: UpdateConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| NotifierError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| NotifierError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply environment variable overrides on top of this configuration
    pub fn apply_env(&mut self) {
        if let Ok(name) = std::env::var("NOTIFIER_SITE_NAME") {
            self.site.name = name;
        }
        if let Ok(host) = std::env::var("NOTIFIER_SITE_HOST") {
            self.site.host = host;
        }
        if let Ok(host) = std::env::var("NOTIFIER_LINK_HOST") {
            self.connection.host = host;
        }
        if let Ok(port) = std::env::var("NOTIFIER_LINK_PORT") {
            if let Ok(port) = port.parse() {
                self.connection.port = port;
            }
        }
        if let Ok(agent) = std::env::var("NOTIFIER_USER_AGENT") {
            self.connection.user_agent = agent;
        }
        if let Ok(url) = std::env::var("NOTIFIER_UPDATE_URL") {
            self.update.url = url;
        }
        if let Ok(key) = std::env::var("NOTIFIER_UPDATE_PUBLIC_KEY") {
            self.update.public_key = key;
        }
    }

    /// Load configuration: file if present, defaults otherwise, env on top
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path.or_else(Self::default_path) {
            Some(p) if p.exists() => Self::from_file(p)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Default config file location (`<config dir>/notifier/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("notifier").join("config.toml"))
    }
}

/// Site identity and URL layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Display name used in notifications and the tooltip header
    #[serde(default = "default_site_name")]
    pub name: String,

    /// Web host for chat/authorize URLs
    #[serde(default = "default_site_host")]
    pub host: String,
}

impl SiteConfig {
    /// URL of the chat page
    pub fn chat_url(&self) -> String {
        format!("http://{}/chat", self.host)
    }

    /// URL of the authorization page for the given session cookie
    pub fn authorize_url(&self, cookie: &str) -> String {
        format!("http://{}/authorize?c={}", self.host, cookie)
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            host: default_site_host(),
        }
    }
}

/// Command-link connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Link server host
    #[serde(default = "default_site_host")]
    pub host: String,

    /// Link server port
    #[serde(default = "default_link_port")]
    pub port: u16,

    /// User agent reported during registration
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_site_host(),
            port: default_link_port(),
            user_agent: default_user_agent(),
        }
    }
}

/// Reconnect policy tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial reconnect delay in seconds
    #[serde(default = "default_retry_base_secs")]
    pub base_delay_secs: u64,

    /// Reconnect delay cap in seconds
    #[serde(default = "default_retry_max_secs")]
    pub max_delay_secs: u64,

    /// Immediate-retry budget for protocol framing errors
    #[serde(default = "default_framing_retries")]
    pub framing_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_secs: default_retry_base_secs(),
            max_delay_secs: default_retry_max_secs(),
            framing_retries: default_framing_retries(),
        }
    }
}

/// Self-update settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Fallback update URL when the server pushes an empty one
    #[serde(default)]
    pub url: String,

    /// Hex-encoded Ed25519 public key for update verification
    #[serde(default)]
    pub public_key: String,
}

fn default_site_name() -> String {
    "Notifier".to_string()
}

fn default_site_host() -> String {
    "chat.example.org".to_string()
}

fn default_link_port() -> u16 {
    4242
}

fn default_user_agent() -> String {
    format!(
        "Notifier/{} ({})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS
    )
}

fn default_retry_base_secs() -> u64 {
    5
}

fn default_retry_max_secs() -> u64 {
    600
}

fn default_framing_retries() -> u32 {
    3
}
