//! vss-ingest - variant classification ingestion
//!
//! `vss-ingest run <feed>` processes one feed snapshot: merge into the
//! variant store, notify subscribers, append to the run ledger.
//! `vss-ingest status` prints what the landing page shows.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vss_common::config::{LoggingConfig, RootFolderInitializer, TomlConfig};
use vss_common::db::{init_database, RunLedger, SqliteStore};
use vss_ingest::config::{CliOverrides, IngestConfig, BASE_URL_ENV, MODULE_NAME};
use vss_ingest::notify::{ChatWebhook, MailTransport, SendGridMailer, SlackWebhookClient};
use vss_ingest::{Delivery, FeedReader, IngestionPipeline, PipelineSettings};

#[derive(Debug, Parser)]
#[command(name = "vss-ingest", version, about = "Variant classification ingestion")]
struct Cli {
    /// Root folder holding vss.db (overrides VSS_ROOT_FOLDER and TOML)
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest one feed snapshot (TSV, optionally gzip-compressed)
    Run {
        feed: PathBuf,

        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,

        /// Genome build the feed is reported on
        #[arg(long)]
        genome_build: Option<String>,

        /// Public site URL used in notification links
        #[arg(long, env = BASE_URL_ENV)]
        base_url: Option<String>,
    },

    /// Print subscribed variant count and the latest run
    Status,
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match &logging.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.init(),
    }
    Ok(())
}

fn build_delivery(config: &IngestConfig) -> Result<Delivery> {
    let mail: Option<Arc<dyn MailTransport>> = match &config.mailer.api_key {
        Some(api_key) => Some(Arc::new(SendGridMailer::new(
            config.mailer.api_url.clone(),
            api_key.clone(),
            config.mailer.from_email.clone(),
            config.mailer.from_name.clone(),
        )?)),
        None => {
            warn!("No mail API key configured, email notifications disabled");
            None
        }
    };
    let chat: Arc<dyn ChatWebhook> = Arc::new(SlackWebhookClient::new()?);

    Ok(Delivery::new(mail, chat)
        .with_base_url(config.base_url.clone())
        .with_concurrency(config.delivery_concurrency)
        .with_dry_run(config.dry_run))
}

async fn open_store(config: &IngestConfig) -> Result<SqliteStore> {
    RootFolderInitializer::new(config.root_folder.clone()).ensure_directory_exists()?;
    info!("Database path: {}", config.database_path.display());

    let pool = match init_database(&config.database_path, &config.database).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    Ok(SqliteStore::new(pool)
        .with_max_lock_wait_ms(config.database.max_lock_wait_ms)
        .with_write_concurrency(config.write_concurrency))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let toml = TomlConfig::load(MODULE_NAME);
    init_tracing(&toml.logging)?;

    info!(
        "Starting vss-ingest v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match cli.command {
        Command::Run {
            feed,
            dry_run,
            genome_build,
            base_url,
        } => {
            let overrides = CliOverrides {
                root_folder: cli.root_folder,
                base_url,
                genome_build,
                dry_run,
            };
            let config = IngestConfig::resolve(&toml, overrides);
            if config.dry_run {
                info!("Dry run: notifications will be logged, not sent");
            }

            let store = open_store(&config).await?;
            let delivery = build_delivery(&config)?;
            let pipeline =
                IngestionPipeline::with_sqlite(store, delivery, PipelineSettings::from(&config));

            let records = FeedReader::open(&feed)
                .with_context(|| format!("Open feed {}", feed.display()))?
                .records();
            let run = pipeline.run(records).await?;

            println!(
                "run {}: inserted {}, modified {}, notified {}, skipped {}, failed {}",
                run.run_id,
                run.inserted_count,
                run.modified_count,
                run.notified_count,
                run.skipped_count,
                run.failed_count
            );
        }
        Command::Status => {
            let overrides = CliOverrides {
                root_folder: cli.root_folder,
                ..Default::default()
            };
            let config = IngestConfig::resolve(&toml, overrides);
            let store = open_store(&config).await?;

            let stats = store.site_stats().await?;
            println!("subscribed variants: {}", stats.subscribed_variants);
            match store.latest_run().await? {
                Some(run) => println!(
                    "last run {} finished {}: inserted {}, modified {}, notified {}",
                    run.run_id,
                    run.finished_at.to_rfc3339(),
                    run.inserted_count,
                    run.modified_count,
                    run.notified_count
                ),
                None => println!("no ingestion runs recorded"),
            }
        }
    }

    Ok(())
}
