pub mod analysis;
pub mod backfill;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod index;
pub mod logging;
pub mod query;
pub mod secrets;
pub mod watcher;

pub use analysis::{
    AnalysisProcessor, AnthropicClassifier, Classification, Classifier, LabelScheme,
    MessageProcessor, ProcessOutcome, ProcessorFactory,
};
pub use backfill::{backfill, reindex, BackfillReport};
pub use config::{load_config, Config};
pub use db::{Database, MessageStore};
pub use email::{GatewayConnector, MailboxGateway, McpGatewayConnector, RawMessage};
pub use error::{ConfigError, Result, TriageError};
pub use index::{SemanticIndex, SemanticStore};
pub use query::QueryEngine;
pub use secrets::{resolve_secret, SecretError, SecretSource};
pub use watcher::{StopSignal, Watcher, WatcherOptions};
