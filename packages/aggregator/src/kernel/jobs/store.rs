//! Job store and claim engine.
//!
//! Every mutation is a single statement guarded by its WHERE clause. The claim
//! uses `FOR UPDATE SKIP LOCKED` so concurrent workers racing on the same due
//! row never both receive it: the loser skips the locked row and either gets
//! the next due row or nothing.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::debug;

use super::error::JobError;
use super::job::{Job, JobPayload, JobType, NewJob};
use crate::common::{FeedId, JobId};

/// Claims older than this are presumed abandoned by a crashed worker.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// Result of one execution, written back through [`JobStore::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub success: bool,
    pub next_run_at: DateTime<Utc>,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl JobOutcome {
    pub fn success(next_run_at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            next_run_at,
            error: None,
            metadata: None,
        }
    }

    pub fn failure(next_run_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            next_run_at,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
    stale_after: Duration,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn stale_after_secs(&self) -> f64 {
        self.stale_after.as_secs_f64()
    }

    /// Insert a task row. Not idempotent: a second create for the same
    /// keyed entity violates the `(job_type, reference_id)` index.
    pub async fn create(&self, job: impl Into<NewJob>) -> Result<Job, JobError> {
        let job = job.into();
        let payload = job.payload.to_json()?;

        let row = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, job_type, reference_id, payload, next_run_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(job.payload.job_type())
        .bind(job.payload.reference_id())
        .bind(payload)
        .bind(job.next_run_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(job_id = %row.id, job_type = %row.job_type, "job created");
        Ok(row)
    }

    /// Generic entry point for features that enqueue their own one-shot work.
    pub async fn create_one_shot(
        &self,
        payload: JobPayload,
        run_at: Option<DateTime<Utc>>,
    ) -> Result<Job, JobError> {
        let job = match run_at {
            Some(at) => NewJob::builder().payload(payload).next_run_at(at).build(),
            None => NewJob::from(payload),
        };
        self.create(job).await
    }

    /// Atomically claim the due row with the oldest `next_run_at`.
    ///
    /// A row is claimable when it is due and either unclaimed or its claim has
    /// gone stale. Returns `None` when nothing is available.
    pub async fn claim(&self, job_type: Option<JobType>) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            WITH next_job AS (
                SELECT id FROM jobs
                WHERE ($1::job_type IS NULL OR job_type = $1)
                  AND next_run_at <= NOW()
                  AND (running_since IS NULL
                       OR running_since < NOW() - make_interval(secs => $2))
                ORDER BY next_run_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE jobs
            SET running_since = NOW(), updated_at = NOW()
            FROM next_job
            WHERE jobs.id = next_job.id
            RETURNING jobs.*
            "#,
        )
        .bind(job_type)
        .bind(self.stale_after_secs())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(job) = &job {
            debug!(
                job_id = %job.id,
                job_type = %job.job_type,
                consecutive_failures = job.consecutive_failures,
                "job claimed"
            );
        }

        Ok(job)
    }

    /// Release the claim and record the execution outcome.
    ///
    /// Success resets `consecutive_failures` and clears `last_error`; failure
    /// increments the counter and records the error. The update only applies
    /// while the row still carries the claim `job` was returned with, so a
    /// worker whose claim went stale and was reclaimed cannot release the new
    /// claimant's run. A missing row is an error.
    pub async fn finish(&self, job: &Job, outcome: &JobOutcome) -> Result<Job, JobError> {
        let finished = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET running_since = NULL,
                last_run_at = NOW(),
                next_run_at = $2,
                consecutive_failures = CASE WHEN $3 THEN 0 ELSE consecutive_failures + 1 END,
                last_error = CASE WHEN $3 THEN NULL ELSE $4 END,
                updated_at = NOW()
            WHERE id = $1
              AND running_since IS NOT DISTINCT FROM $5
            RETURNING *
            "#,
        )
        .bind(job.id)
        .bind(outcome.next_run_at)
        .bind(outcome.success)
        .bind(&outcome.error)
        .bind(job.running_since)
        .fetch_optional(&self.pool)
        .await?;

        let Some(finished) = finished else {
            return match self.find_by_id(job.id).await? {
                Some(_) => Err(JobError::ClaimLost(job.id)),
                None => Err(JobError::TaskNotFound(job.id)),
            };
        };

        debug!(
            job_id = %finished.id,
            job_type = %finished.job_type,
            success = outcome.success,
            next_run_at = %outcome.next_run_at,
            consecutive_failures = finished.consecutive_failures,
            "job finished"
        );

        Ok(finished)
    }

    pub async fn find_by_id(&self, job_id: JobId) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    pub async fn find_feed_job(&self, feed_id: FeedId) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs WHERE job_type = $1 AND reference_id = $2",
        )
        .bind(JobType::FetchFeed)
        .bind(feed_id.into_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    /// Guarantee a fetch task exists for the feed.
    ///
    /// Leaves an existing row untouched, including its `next_run_at`.
    pub async fn ensure_feed_job(
        &self,
        feed_id: FeedId,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<Job, JobError> {
        let payload = JobPayload::FetchFeed { feed_id };

        let inserted = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, job_type, reference_id, payload, next_run_at)
            VALUES ($1, $2, $3, $4, COALESCE($5, NOW()))
            ON CONFLICT (job_type, reference_id) WHERE reference_id IS NOT NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(JobType::FetchFeed)
        .bind(feed_id.into_uuid())
        .bind(payload.to_json()?)
        .bind(next_run_at)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(job) => {
                debug!(job_id = %job.id, feed_id = %feed_id, "feed job created");
                Ok(job)
            }
            None => {
                let job = sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE job_type = $1 AND reference_id = $2",
                )
                .bind(JobType::FetchFeed)
                .bind(feed_id.into_uuid())
                .fetch_one(&self.pool)
                .await?;
                Ok(job)
            }
        }
    }

    /// Move the feed's next fetch, creating the task if it does not exist yet.
    ///
    /// Also mirrors the time onto `feeds.next_fetch_at`.
    pub async fn update_feed_job_next_run(
        &self,
        feed_id: FeedId,
        next_run_at: DateTime<Utc>,
    ) -> Result<Job, JobError> {
        let payload = JobPayload::FetchFeed { feed_id };
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, job_type, reference_id, payload, next_run_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (job_type, reference_id) WHERE reference_id IS NOT NULL
            DO UPDATE SET next_run_at = EXCLUDED.next_run_at, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(JobType::FetchFeed)
        .bind(feed_id.into_uuid())
        .bind(payload.to_json()?)
        .bind(next_run_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE feeds SET next_fetch_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(feed_id)
            .bind(next_run_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(job)
    }

    /// Re-derive whether the feed still warrants a task.
    ///
    /// Eligibility lives in the claim predicate, so a feed that lost its last
    /// subscriber needs no row change. A feed that still has subscribers gets
    /// its row ensured. Returns whether the feed is eligible.
    pub async fn resync_feed_job(&self, feed_id: FeedId) -> Result<bool, JobError> {
        let (eligible,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM subscriptions
                WHERE feed_id = $1 AND unsubscribed_at IS NULL
            )
            "#,
        )
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;

        if eligible {
            self.ensure_feed_job(feed_id, None).await?;
        } else {
            debug!(feed_id = %feed_id, "feed has no active subscribers, job left ineligible");
        }

        Ok(eligible)
    }
}
