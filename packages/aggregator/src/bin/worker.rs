// Job worker entry point
//
// Polls the shared job table and runs feed fetches, WebSub renewals, imports
// and score training until Ctrl-C, then drains in-flight jobs.

use std::sync::Arc;
use std::time::Duration;

use aggregator_core::kernel::jobs::{
    JobDispatcher, JobStore, JobType, JobWorker, JobWorkerConfig, StoreClaimSource,
};
use aggregator_core::kernel::noop::{
    NoopEntryProcessor, NoopFeedParser, NoopImportProcessor, NoopScoreTrainer, NoopWebSubRenewer,
};
use aggregator_core::kernel::{HttpFeedFetcher, ServerDeps, TracingErrorReporter};
use aggregator_core::Config;
use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "worker")]
#[command(about = "Feed aggregator job worker")]
struct Cli {
    /// Maximum jobs executing at once (overrides WORKER_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,

    /// Seconds to wait when the queue is empty (overrides WORKER_POLL_INTERVAL_SECS)
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Only claim jobs of this type (e.g. fetch_feed)
    #[arg(long)]
    only: Option<JobType>,

    /// Identifier used in logs
    #[arg(long)]
    worker_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aggregator_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let jobs = JobStore::new(pool.clone()).with_stale_after(config.job_stale_after);
    let fetcher = HttpFeedFetcher::new(config.fetch_timeout, &config.fetch_user_agent)
        .context("Failed to create feed fetcher")?;

    let deps = ServerDeps::builder()
        .db_pool(pool)
        .jobs(jobs.clone())
        .fetcher(Arc::new(fetcher))
        .parser(Arc::new(NoopFeedParser))
        .entry_processor(Arc::new(NoopEntryProcessor))
        .websub_renewer(Arc::new(NoopWebSubRenewer))
        .import_processor(Arc::new(NoopImportProcessor))
        .score_trainer(Arc::new(NoopScoreTrainer))
        .error_reporter(Arc::new(TracingErrorReporter))
        .websub_renew_hours_before_expiry(config.websub_renew_hours_before_expiry)
        .build();

    let mut source = StoreClaimSource::new(jobs);
    if let Some(job_type) = cli.only {
        tracing::info!(job_type = %job_type, "worker restricted to one job type");
        source = source.only(job_type);
    }

    let mut worker_config = match cli.worker_id {
        Some(worker_id) => JobWorkerConfig::with_worker_id(worker_id),
        None => JobWorkerConfig::default(),
    };
    worker_config.concurrency = cli.concurrency.unwrap_or(config.worker_concurrency);
    worker_config.poll_interval = cli
        .poll_interval_secs
        .map(Duration::from_secs)
        .unwrap_or(config.worker_poll_interval);

    let worker = JobWorker::with_config(
        Arc::new(source),
        Arc::new(JobDispatcher::new(deps.clone())),
        deps.error_reporter.clone(),
        worker_config,
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, draining in-flight jobs");
                signal.cancel();
            }
            Err(e) => tracing::error!(error = %e, "failed to listen for shutdown signal"),
        }
    });

    worker.run(shutdown).await
}
