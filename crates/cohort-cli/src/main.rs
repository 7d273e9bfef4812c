//! cohort: embedding backfill and match notification runner.
//!
//! `serve` runs the scheduler until Ctrl-C. The other subcommands run a
//! single pass and print a JSON report to stdout.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cohort_core::defaults::PAGE_LIMIT;
use cohort_core::{DeliveryChannel, EmbeddingBackend, NotificationRepository};
use cohort_db::{Database, PoolConfig};
use cohort_inference::OpenAIBackend;
use cohort_jobs::{
    channel_from_env, shutdown_channel, BackfillConfig, BatchEmbeddingJob, DispatchConfig,
    DispatchJob, Population, Scheduler,
};
use cohort_match::{CategoryTaxonomy, MatchingEngine};

#[derive(Parser)]
#[command(name = "cohort")]
#[command(author, version, about = "Embedding backfill and match notifications")]
#[command(propagate_version = true)]
struct Cli {
    /// PostgreSQL connection string
    #[arg(
        long,
        global = true,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/cohort"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backfill and dispatch jobs on their intervals until Ctrl-C
    Serve,

    /// Run the batch embedding job once
    Embed {
        /// Select and preview only; no provider calls, no writes
        #[arg(long)]
        dry_run: bool,

        /// Maximum entities (0 = all)
        #[arg(long)]
        limit: Option<usize>,

        /// Items per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Sleep between batches in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// profiles, postings or both
        #[arg(long)]
        population: Option<Population>,

        /// Only embed verified entities
        #[arg(long)]
        verified_only: bool,
    },

    /// Run one dispatch tick
    Dispatch {
        /// Similarity candidates per posting (0 = categorical only)
        #[arg(long)]
        similarity_k: Option<usize>,
    },

    /// List notifications that were recorded but never confirmed sent
    Stuck {
        /// Only records created more than this many minutes ago
        #[arg(long, default_value_t = 10)]
        older_than_mins: i64,

        /// Maximum records
        #[arg(long, default_value_t = PAGE_LIMIT)]
        limit: i64,
    },
}

/// Initialize tracing with configurable output.
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | `LOG_FORMAT` | `text` | `json` or `text` |
/// | `LOG_FILE` | (none) | Log file path, rotated daily |
/// | `LOG_ANSI` | auto | Force ANSI colors on or off |
/// | `RUST_LOG` | `cohort=info,cohort_jobs=info` | Env filter |
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cohort=info,cohort_jobs=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let file_dir = Path::new(path).parent().unwrap_or(Path::new("."));
        let file_name = Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("cohort.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Reports go to stdout, logs to stderr.
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

async fn connect(database_url: &str) -> anyhow::Result<Database> {
    let db = Database::connect_with_config(database_url, PoolConfig::from_env())
        .await
        .context("failed to connect to database")?;
    db.init().await.context("failed to initialize database")?;
    Ok(db)
}

fn matching_engine(db: &Database) -> anyhow::Result<MatchingEngine> {
    let taxonomy = CategoryTaxonomy::from_env().context("failed to load taxonomy")?;
    Ok(MatchingEngine::new(
        Arc::new(db.entities.clone()),
        Arc::new(db.embeddings.clone()),
        taxonomy,
    ))
}

fn backfill_job(
    db: &Database,
    backend: Arc<dyn EmbeddingBackend>,
    config: BackfillConfig,
) -> BatchEmbeddingJob {
    BatchEmbeddingJob::new(
        Arc::new(db.entities.clone()),
        Arc::new(db.embeddings.clone()),
        backend,
        config,
    )
}

fn dispatch_job(
    db: &Database,
    engine: MatchingEngine,
    channel: Arc<dyn DeliveryChannel>,
    config: DispatchConfig,
) -> DispatchJob {
    DispatchJob::new(
        Arc::new(db.entities.clone()),
        Arc::new(db.notifications.clone()),
        engine,
        channel,
        config,
    )
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_serve(db: Database) -> anyhow::Result<()> {
    let backend: Arc<dyn EmbeddingBackend> = Arc::new(OpenAIBackend::from_env()?);
    let channel = channel_from_env()?;
    let engine = matching_engine(&db)?;

    let backfill = backfill_job(&db, backend, BackfillConfig::from_env());
    let dispatch = dispatch_job(&db, engine, channel, DispatchConfig::from_env());

    let handle = Scheduler::new()
        .with_job(Arc::new(backfill))
        .with_job(Arc::new(dispatch))
        .start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");
    handle.shutdown().await?;
    Ok(())
}

async fn cmd_embed(db: Database, config: BackfillConfig) -> anyhow::Result<()> {
    let backend: Arc<dyn EmbeddingBackend> = Arc::new(OpenAIBackend::from_env()?);
    let job = backfill_job(&db, backend, config);

    let (shutdown_tx, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, finishing current batch");
            shutdown_tx.send_replace(true);
        }
    });

    let report = job.run(&shutdown).await?;
    print_json(&report)
}

async fn cmd_dispatch(db: Database, config: DispatchConfig) -> anyhow::Result<()> {
    let channel = channel_from_env()?;
    let engine = matching_engine(&db)?;
    let report = dispatch_job(&db, engine, channel, config).run_once().await?;
    print_json(&report)
}

async fn cmd_stuck(db: Database, older_than_mins: i64, limit: i64) -> anyhow::Result<()> {
    let older_than = chrono::Utc::now() - chrono::Duration::minutes(older_than_mins.max(0));
    let records = db.notifications.list_unsent(older_than, limit).await?;
    info!(count = records.len(), "Unsent notifications");
    print_json(&records)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_logging();

    let cli = Cli::parse();
    let db = connect(&cli.database_url).await?;

    match cli.command {
        Commands::Serve => cmd_serve(db).await,
        Commands::Embed {
            dry_run,
            limit,
            batch_size,
            delay_ms,
            population,
            verified_only,
        } => {
            let mut config = BackfillConfig::from_env().with_dry_run(dry_run);
            if let Some(limit) = limit {
                config = config.with_limit(limit);
            }
            if let Some(batch_size) = batch_size {
                config = config.with_batch_size(batch_size);
            }
            if let Some(delay_ms) = delay_ms {
                config = config.with_batch_delay(std::time::Duration::from_millis(delay_ms));
            }
            if let Some(population) = population {
                config = config.with_population(population);
            }
            if verified_only {
                config = config.with_verified_only(true);
            }
            cmd_embed(db, config).await
        }
        Commands::Dispatch { similarity_k } => {
            let mut config = DispatchConfig::from_env();
            if let Some(k) = similarity_k {
                config.similarity_k = k;
            }
            cmd_dispatch(db, config).await
        }
        Commands::Stuck {
            older_than_mins,
            limit,
        } => cmd_stuck(db, older_than_mins, limit).await,
    }
}
