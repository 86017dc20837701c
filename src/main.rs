use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use repertoire_ingest::config::{AppConfig, CliConfig, FileConfig};
use repertoire_ingest::fidelity::FidelityFilter;
use repertoire_ingest::generation::{
    ArrangementGenerator, ArrangementProvider, OpenAiCompatibleProvider, TokioSleeper,
};
use repertoire_ingest::ingestion_log::{IngestionLogger, TracingLogger};
use repertoire_ingest::ingestion_queue::{IngestionTask, QueueMode};
use repertoire_ingest::metadata::MusicBrainzLookup;
use repertoire_ingest::metrics;
use repertoire_ingest::{
    IngestionQueue, IngestionWorker, QueueConsumer, SqliteWorkStore, TaskKind, WorkStore,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    if path_buf.is_absolute() {
        return Ok(path_buf);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path_buf))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite works database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// URL of the task broker, e.g. redis://localhost:6379.
    #[clap(long)]
    pub broker_url: Option<String>,

    /// Write the metrics text exposition to this file on exit.
    #[clap(long, value_parser = parse_path)]
    pub metrics_file: Option<PathBuf>,

    /// Identity recorded as the submitter of new tasks.
    #[clap(long, default_value = "cli")]
    pub submitter: String,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Consume tasks from the broker until interrupted.
    Worker,

    /// Ingest every recording of an artist.
    SubmitArtist { name: String },

    /// Ingest a single recording by catalog id.
    SubmitRecording {
        id: String,

        /// Generate a new arrangement version even if one exists.
        #[clap(long)]
        force: bool,
    },
}

fn write_metrics(path: &Path) -> Result<()> {
    let text = metrics::encode_metrics()?;
    std::fs::write(path, text).with_context(|| format!("Failed to write metrics to {:?}", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    let metrics_file = cli_args.metrics_file.clone();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    metrics::init_metrics();

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        broker_url: cli_args.broker_url.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    info!("Opening SQLite works database at {:?}...", config.db_path);
    let store: Arc<dyn WorkStore> = Arc::new(SqliteWorkStore::new(&config.db_path)?);

    let logger: Arc<dyn IngestionLogger> = Arc::new(TracingLogger);
    let sleeper = Arc::new(TokioSleeper);

    let metadata = Arc::new(MusicBrainzLookup::new(config.metadata.clone())?);
    let provider = Arc::new(OpenAiCompatibleProvider::new(
        config.generation.base_url.clone(),
        config.generation.api_key.clone(),
    ));
    match provider.health_check().await {
        Ok(()) => info!("Generation backend at {} is reachable", config.generation.base_url),
        Err(e) => warn!(
            "Generation backend at {} failed its health check: {}",
            config.generation.base_url, e
        ),
    }
    let generator = ArrangementGenerator::from_settings(
        provider,
        &config.generation,
        sleeper.clone(),
        logger.clone(),
    );
    info!("Generation models: {:?}", generator.models());

    let worker = Arc::new(IngestionWorker::new(
        metadata,
        generator,
        FidelityFilter::new(config.fidelity.clone()),
        store,
        &config.worker,
        sleeper,
        logger.clone(),
    )?);

    let queue = IngestionQueue::connect(config.queue.clone(), worker, logger).await;
    info!("Ingestion queue running in {:?} mode", queue.mode());

    let kind = match cli_args.command {
        Command::Worker => {
            let shutdown = CancellationToken::new();
            let signal_token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupt received, shutting down");
                }
                signal_token.cancel();
            });

            if queue.mode() == QueueMode::Fallback {
                warn!("No broker available, the worker has nothing to consume");
                return Ok(());
            }
            QueueConsumer::new(queue).run(shutdown).await;
            if let Some(path) = &metrics_file {
                write_metrics(path)?;
            }
            return Ok(());
        }
        Command::SubmitArtist { name } => TaskKind::artist(name),
        Command::SubmitRecording { id, force } => TaskKind::recording(id, force),
    };

    let mut reports = queue.subscribe();
    let task = IngestionTask::new(kind, cli_args.submitter);
    let task_id = task.task_id.clone();
    queue.submit(task).await?;

    if queue.mode() == QueueMode::Durable {
        info!("Task {} queued", task_id);
        println!("{}", task_id);
        if let Some(path) = &metrics_file {
            write_metrics(path)?;
        }
        return Ok(());
    }

    while let Ok(report) = reports.try_recv() {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if let Some(path) = &metrics_file {
        write_metrics(path)?;
    }
    Ok(())
}
