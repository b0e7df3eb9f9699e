use std::path::Path;

use log::{debug, info};

use crate::config::schema::{Config, CONFIG_VERSION};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Loads the config file at `path`, falling back to defaults when it does
/// not exist, then applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        info!("Loading config from {}", path.display());
        parse_config(&content)?
    } else {
        info!("No config at {}, using defaults", path.display());
        Config::default()
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates a config document. No environment overrides.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config = parse_config(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    validate_schema(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: errors.join("; "),
        });
    }

    Ok(())
}

/// Applies `POLL_INTERVAL_SECONDS`, `USER_GOOGLE_EMAIL`,
/// `GMAIL_MCP_SERVER_PATH` and `WORKSPACE_MCP_PORT`.
pub(crate) fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(value) = get("POLL_INTERVAL_SECONDS") {
        config.watcher.poll_interval_secs = parse_env("POLL_INTERVAL_SECONDS", &value)?;
    }
    if let Some(value) = get("USER_GOOGLE_EMAIL") {
        config.gateway.user_email = value.trim().to_string();
    }
    if let Some(value) = get("GMAIL_MCP_SERVER_PATH") {
        debug!("Gateway command overridden by GMAIL_MCP_SERVER_PATH");
        config.gateway.command = value;
    }
    if let Some(value) = get("WORKSPACE_MCP_PORT") {
        config.gateway.port = parse_env("WORKSPACE_MCP_PORT", &value)?;
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
        })
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    let watcher = &config.watcher;
    for (name, value) in [
        ("watcher.poll_interval_secs", watcher.poll_interval_secs),
        ("watcher.poll_batch", watcher.poll_batch as u64),
        ("watcher.seed_batch", watcher.seed_batch as u64),
        ("watcher.backoff_cap_secs", watcher.backoff_cap_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation {
                message: format!("{} must be positive", name),
            });
        }
    }

    let labels = &config.labels;
    for (name, value) in [
        ("labels.root", &labels.root),
        ("labels.human", &labels.human),
        ("labels.follow_up", &labels.follow_up),
        ("labels.automated", &labels.automated),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: format!("{} must not be empty", name),
            });
        }
    }

    Ok(())
}
