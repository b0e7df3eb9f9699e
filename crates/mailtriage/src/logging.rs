//! Process-wide log setup for the binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::TriageError;

/// Installs the global tracing subscriber and routes `log` records into it.
///
/// `RUST_LOG` takes precedence over the configured level. Output goes to
/// stderr. Fails if a global subscriber or logger is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TriageError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.level)?,
    };
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
    };
    installed.map_err(|e| TriageError::Logging(e.to_string()))?;

    tracing_log::LogTracer::init().map_err(|e| TriageError::Logging(e.to_string()))?;
    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter, TriageError> {
    EnvFilter::try_new(level)
        .map_err(|e| TriageError::Logging(format!("invalid log level '{}': {}", level, e)))
}
