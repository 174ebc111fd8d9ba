//! Bounded-concurrency job worker.
//!
//! The `JobWorker` is a long-running loop that:
//! - Claims due jobs from a `ClaimSource` until `concurrency` are in flight
//! - Runs each job's handler on its own task
//! - Writes every outcome back through `ClaimSource::finish`
//! - Drains in-flight jobs on shutdown
//!
//! # Architecture
//!
//! ```text
//! JobWorker
//!     │
//!     ├─► Fill: claim_next() until at capacity or the queue is empty
//!     ├─► Wait: next completion, poll interval, or shutdown
//!     │       └─► JobHandler.handle(job) (errors and panics caught)
//!     └─► finish(job, outcome)
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::backoff::handler_failure_backoff;
use super::error::JobError;
use super::job::{Job, JobType};
use super::store::{JobOutcome, JobStore};
use crate::kernel::{BaseErrorReporter, JobErrorContext};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// Maximum number of jobs executing at once
    pub concurrency: usize,
    /// How long to wait when the queue is empty
    pub poll_interval: Duration,
    /// Worker ID for this instance
    pub worker_id: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_secs(5),
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }
}

impl JobWorkerConfig {
    /// Create a new config with a specific worker ID.
    pub fn with_worker_id(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..Default::default()
        }
    }
}

/// Where the worker gets jobs and returns outcomes.
#[async_trait]
pub trait ClaimSource: Send + Sync {
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Record the outcome of a job returned by `claim_next`.
    async fn finish(&self, job: &Job, outcome: &JobOutcome) -> Result<()>;
}

/// Executes one claimed job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Returning `Err` is a handler defect: the worker records a failure with
    /// a short fixed backoff and reports it.
    async fn handle(&self, job: &Job) -> Result<JobOutcome>;
}

const CLAIM_ORDER: [JobType; 4] = [
    JobType::RenewWebsubSubscriptions,
    JobType::FetchFeed,
    JobType::ProcessImport,
    JobType::TrainScoreModel,
];

/// Claims from the job store, one job type at a time.
///
/// Each call starts from the next type in rotation, so a backlog of one type
/// cannot keep due jobs of another type waiting.
pub struct StoreClaimSource {
    store: JobStore,
    only: Option<JobType>,
    next_start: AtomicUsize,
}

impl StoreClaimSource {
    pub fn new(store: JobStore) -> Self {
        Self {
            store,
            only: None,
            next_start: AtomicUsize::new(0),
        }
    }

    /// Restrict this worker to a single job type.
    pub fn only(mut self, job_type: JobType) -> Self {
        self.only = Some(job_type);
        self
    }

    async fn claim_type(&self, job_type: JobType) -> Result<Option<Job>> {
        let job = match job_type {
            JobType::RenewWebsubSubscriptions => {
                self.store.claim_singleton_job(job_type).await?
            }
            JobType::FetchFeed => self.store.claim_feed_job().await?,
            JobType::ProcessImport => self.store.claim(Some(job_type)).await?,
            JobType::TrainScoreModel => self.store.claim_score_training_job().await?,
        };
        Ok(job)
    }
}

#[async_trait]
impl ClaimSource for StoreClaimSource {
    async fn claim_next(&self) -> Result<Option<Job>> {
        if let Some(job_type) = self.only {
            return self.claim_type(job_type).await;
        }

        let start = self.next_start.fetch_add(1, Ordering::Relaxed);
        for offset in 0..CLAIM_ORDER.len() {
            let job_type = CLAIM_ORDER[(start + offset) % CLAIM_ORDER.len()];
            if let Some(job) = self.claim_type(job_type).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn finish(&self, job: &Job, outcome: &JobOutcome) -> Result<()> {
        match self.store.finish(job, outcome).await {
            Ok(_) => Ok(()),
            Err(JobError::ClaimLost(job_id)) => {
                warn!(job_id = %job_id, job_type = %job.job_type, "claim went stale and was reclaimed, outcome dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Worker loop over a claim source and a handler.
pub struct JobWorker {
    source: Arc<dyn ClaimSource>,
    handler: Arc<dyn JobHandler>,
    reporter: Arc<dyn BaseErrorReporter>,
    config: JobWorkerConfig,
}

impl JobWorker {
    pub fn new(
        source: Arc<dyn ClaimSource>,
        handler: Arc<dyn JobHandler>,
        reporter: Arc<dyn BaseErrorReporter>,
    ) -> Self {
        Self::with_config(source, handler, reporter, JobWorkerConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn ClaimSource>,
        handler: Arc<dyn JobHandler>,
        reporter: Arc<dyn BaseErrorReporter>,
        config: JobWorkerConfig,
    ) -> Self {
        Self {
            source,
            handler,
            reporter,
            config,
        }
    }

    /// Run until `shutdown` fires, then wait for in-flight jobs.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let concurrency = self.config.concurrency.max(1);
        info!(
            worker_id = %self.config.worker_id,
            concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "job worker starting"
        );

        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            // Fill up to capacity; stop at the first empty claim.
            while in_flight.len() < concurrency && !shutdown.is_cancelled() {
                match self.source.claim_next().await {
                    Ok(Some(job)) => {
                        in_flight.spawn(execute(
                            job,
                            self.source.clone(),
                            self.handler.clone(),
                            self.reporter.clone(),
                        ));
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(worker_id = %self.config.worker_id, error = %e, "failed to claim job");
                        break;
                    }
                }
            }

            if in_flight.len() >= concurrency {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    Some(joined) = in_flight.join_next() => log_join(joined),
                }
            } else if in_flight.is_empty() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            } else {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    Some(joined) = in_flight.join_next() => log_join(joined),
                    _ = tokio::time::sleep(self.config.poll_interval) => {}
                }
            }
        }

        info!(
            worker_id = %self.config.worker_id,
            in_flight = in_flight.len(),
            "job worker draining"
        );
        while let Some(joined) = in_flight.join_next().await {
            log_join(joined);
        }
        info!(worker_id = %self.config.worker_id, "job worker stopped");

        Ok(())
    }
}

/// Run one job and always finish it, whatever the handler does.
async fn execute(
    job: Job,
    source: Arc<dyn ClaimSource>,
    handler: Arc<dyn JobHandler>,
    reporter: Arc<dyn BaseErrorReporter>,
) {
    let context = JobErrorContext {
        job_id: job.id,
        job_type: job.job_type,
        consecutive_failures: job.consecutive_failures,
    };

    let result = AssertUnwindSafe(handler.handle(&job)).catch_unwind().await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => defect_outcome(e, context, reporter.as_ref()).await,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            let e = anyhow::anyhow!("handler panicked: {}", message);
            defect_outcome(e, context, reporter.as_ref()).await
        }
    };

    if outcome.success {
        debug!(job_id = %job.id, job_type = %job.job_type, next_run_at = %outcome.next_run_at, "job succeeded");
    } else {
        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            consecutive_failures = job.consecutive_failures + 1,
            error = ?outcome.error,
            next_run_at = %outcome.next_run_at,
            "job failed"
        );
    }

    if let Err(e) = source.finish(&job, &outcome).await {
        error!(job_id = %job.id, job_type = %job.job_type, error = %e, "failed to finish job");
    }
}

async fn defect_outcome(
    e: anyhow::Error,
    context: JobErrorContext,
    reporter: &dyn BaseErrorReporter,
) -> JobOutcome {
    error!(
        job_id = %context.job_id,
        job_type = %context.job_type,
        consecutive_failures = context.consecutive_failures,
        error = %format!("{:#}", e),
        "job handler failed unexpectedly"
    );
    reporter.report(&e, context).await;
    JobOutcome::failure(Utc::now() + handler_failure_backoff(), format!("{:#}", e))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "job task aborted");
    }
}
