use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{error, info};

use mailtriage::config::{Config, StorageConfig};
use mailtriage::db::MessageStore;
use mailtriage::email::DEFAULT_SEED_BATCH;
use mailtriage::error::ConfigError;
use mailtriage::index::SemanticStore;
use mailtriage::logging::init_logging;
use mailtriage::{
    backfill, load_config, reindex, AnalysisProcessor, AnthropicClassifier, Database,
    GatewayConnector, McpGatewayConnector, ProcessorFactory, QueryEngine, SemanticIndex,
    TriageError, Watcher, WatcherOptions,
};

/// Unattended mailbox triage agent.
#[derive(Parser, Debug)]
#[command(name = "mailtriage", about = "Classify, label and index new mail", version)]
struct Cli {
    /// Config file [default: ~/.mailtriage/config.json]
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Watch the mailbox until interrupted (the default).
    Run,

    /// Process mail from the last DAYS days that is not stored yet.
    Backfill {
        /// How far back to look, in days.
        days: u32,
    },

    /// Rebuild the semantic index from the database.
    Reindex,

    /// Semantic search over indexed mail.
    Search {
        /// Free-text query; multiple words are joined.
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Maximum number of hits.
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".mailtriage").join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config.logging) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    info!("Starting mailtriage v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    match runtime.block_on(execute(command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: Config) -> Result<(), TriageError> {
    match command {
        Command::Run => run_watcher(config).await,
        Command::Backfill { days } => run_backfill(config, days).await,
        Command::Reindex => {
            let (db, index) = open_both(&config.storage)?;
            let count = reindex(&db, &index)?;
            println!("Indexed {} stored messages.", count);
            Ok(())
        }
        Command::Search { query, limit } => {
            let (db, index) = open_both(&config.storage)?;
            let engine = QueryEngine::new(db, index);
            for hit in engine.search(&query.join(" "), limit)? {
                println!(
                    "{:.3}  {}  {}  {}",
                    hit.distance, hit.id, hit.metadata.sender, hit.metadata.subject
                );
            }
            Ok(())
        }
    }
}

async fn run_watcher(config: Config) -> Result<(), TriageError> {
    let (db, index) = open_stores(&config.storage)?;
    let connector: Arc<dyn GatewayConnector> =
        Arc::new(McpGatewayConnector::new(config.gateway.clone())?);
    let factory = processor_factory(&config, db, index)?;

    let watcher = Watcher::new(
        connector,
        factory,
        WatcherOptions::from(&config.watcher),
        config.labels.clone(),
    );

    let signal = watcher.stop_signal();
    ctrlc::set_handler(move || {
        info!("Shutdown requested");
        signal.stop();
    })?;

    watcher.run().await;
    Ok(())
}

async fn run_backfill(config: Config, days: u32) -> Result<(), TriageError> {
    let (db, index) = open_stores(&config.storage)?;
    let db = db.ok_or_else(|| storage_disabled("storage.database"))?;

    let connector = McpGatewayConnector::new(config.gateway.clone())?;
    let factory = processor_factory(&config, Some(db.clone()), index)?;

    let gateway = connector.connect().await?;
    let processor = factory(Arc::clone(&gateway));
    let result = backfill(
        gateway.as_ref(),
        processor.as_ref(),
        &db,
        days,
        DEFAULT_SEED_BATCH,
    )
    .await;
    if let Err(e) = gateway.close().await {
        error!("Failed to close gateway: {}", e);
    }

    let report = result?;
    println!(
        "Fetched {}, already stored {}, processed {}, failed {}.",
        report.fetched, report.skipped, report.processed, report.failed
    );
    Ok(())
}

fn processor_factory(
    config: &Config,
    db: Option<Database>,
    index: Option<SemanticIndex>,
) -> Result<ProcessorFactory, TriageError> {
    let api_key = config.classifier.api_key.resolve()?;
    let classifier = Arc::new(AnthropicClassifier::new(&config.classifier, api_key)?);
    let index = index.map(|i| Arc::new(i) as Arc<dyn SemanticStore>);
    let store = db.map(|d| Arc::new(d) as Arc<dyn MessageStore>);
    Ok(AnalysisProcessor::factory(
        classifier,
        config.labels.clone(),
        index,
        store,
    ))
}

fn open_stores(
    storage: &StorageConfig,
) -> Result<(Option<Database>, Option<SemanticIndex>), TriageError> {
    let db = if storage.database.enabled {
        let path = storage
            .database_path()
            .ok_or_else(|| storage_disabled("storage.data_dir"))?;
        Some(Database::open(&path)?)
    } else {
        None
    };
    let index = if storage.index.enabled {
        let dir = storage
            .index_dir()
            .ok_or_else(|| storage_disabled("storage.data_dir"))?;
        Some(SemanticIndex::open(&dir)?)
    } else {
        None
    };
    Ok((db, index))
}

fn open_both(storage: &StorageConfig) -> Result<(Database, SemanticIndex), TriageError> {
    match open_stores(storage)? {
        (Some(db), Some(index)) => Ok((db, index)),
        (None, _) => Err(storage_disabled("storage.database")),
        (_, None) => Err(storage_disabled("storage.index")),
    }
}

fn storage_disabled(what: &str) -> TriageError {
    TriageError::Config(ConfigError::Validation {
        message: format!("{} is disabled or cannot be resolved", what),
    })
}
