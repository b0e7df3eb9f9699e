use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::analysis::LabelScheme;
use crate::db;
use crate::email::{DEFAULT_POLL_BATCH, DEFAULT_SEED_BATCH};
use crate::secrets::SecretSource;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub labels: LabelScheme,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> String {
    CONFIG_VERSION.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            watcher: WatcherConfig::default(),
            gateway: GatewayConfig::default(),
            classifier: ClassifierConfig::default(),
            storage: StorageConfig::default(),
            labels: LabelScheme::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_batch")]
    pub poll_batch: usize,
    #[serde(default = "default_seed_batch")]
    pub seed_batch: usize,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
}

fn default_poll_interval() -> u64 {
    60
}

fn default_poll_batch() -> usize {
    DEFAULT_POLL_BATCH
}

fn default_seed_batch() -> usize {
    DEFAULT_SEED_BATCH
}

fn default_backoff_cap() -> u64 {
    300
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_batch: default_poll_batch(),
            seed_batch: default_seed_batch(),
            backoff_cap_secs: default_backoff_cap(),
        }
    }
}

/// How to launch the mailbox MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_command")]
    pub command: String,
    /// Empty means "pick arguments for the command".
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub user_email: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_gateway_timeout")]
    pub request_timeout_secs: u64,
}

fn default_command() -> String {
    "uvx".to_string()
}

fn default_port() -> u16 {
    18741
}

fn default_gateway_timeout() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            env: HashMap::new(),
            user_email: String::new(),
            port: default_port(),
            request_timeout_secs: default_gateway_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_classifier_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_api_key")]
    pub api_key: SecretSource,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-haiku-4-5-20251001".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_classifier_timeout() -> u64 {
    60
}

fn default_api_key() -> SecretSource {
    SecretSource::env("ANTHROPIC_API_KEY")
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_classifier_timeout(),
            api_key: default_api_key(),
        }
    }
}

/// Where the relational store and the semantic index live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Defaults to `~/.mailtriage/data`.
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub database: StoreToggle,
    #[serde(default)]
    pub index: StoreToggle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StoreToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl StorageConfig {
    /// Resolved data directory, if one can be determined.
    pub fn data_dir(&self) -> Option<PathBuf> {
        match self.data_dir.as_deref().filter(|d| !d.is_empty()) {
            Some(dir) => Some(PathBuf::from(dir)),
            None => db::default_data_dir(),
        }
    }

    pub fn database_path(&self) -> Option<PathBuf> {
        self.data_dir().map(|d| d.join("mailtriage.db"))
    }

    pub fn index_dir(&self) -> Option<PathBuf> {
        self.data_dir().map(|d| d.join("index"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
        }
    }
}
