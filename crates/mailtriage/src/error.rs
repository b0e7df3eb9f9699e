use std::path::PathBuf;
use thiserror::Error;

/// Startup and wiring failures. Runtime failures inside the watcher are
/// logged and retried rather than surfaced here.
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Semantic index error: {0}")]
    Index(#[from] crate::index::IndexError),

    #[error("Mailbox gateway error: {0}")]
    Gateway(#[from] crate::email::GatewayError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] crate::analysis::ClassifyError),

    #[error("Backfill error: {0}")]
    Backfill(#[from] crate::backfill::BackfillError),

    #[error("Query error: {0}")]
    Query(#[from] crate::query::QueryError),

    #[error("Failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },
}

pub type Result<T> = std::result::Result<T, TriageError>;
