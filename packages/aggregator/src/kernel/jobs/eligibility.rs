//! Data-driven eligibility.
//!
//! Whether a task should run is re-derived from live data on every claim
//! (active subscribers, scoring signals) instead of a cached "enabled" flag.
//! Rows for newly qualifying entities are created by a discovery pass and
//! picked up on a later claim.

use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::JobError;
use super::job::{Job, JobPayload, JobType};
use super::store::JobStore;
use crate::common::JobId;

/// Users need this many scoring signals before a model is worth training.
pub const MIN_SCORE_SIGNALS: i64 = 20;

/// A trained model younger than this is considered fresh.
pub const SCORE_MODEL_MAX_AGE_HOURS: i64 = 24;

/// Upper bound on rows a single discovery pass creates.
const DISCOVERY_BATCH: i64 = 100;

const FEED_HAS_ACTIVE_SUBSCRIBER: &str = r#"
    EXISTS (
        SELECT 1 FROM subscriptions s
        WHERE s.feed_id = j.reference_id AND s.unsubscribed_at IS NULL
    )
"#;

const USER_NEEDS_SCORE_MODEL: &str = r#"
    (SELECT COUNT(*) FROM user_score_signals sig WHERE sig.user_id = j.reference_id) >= $3
    AND NOT EXISTS (
        SELECT 1 FROM user_score_models m
        WHERE m.user_id = j.reference_id
          AND m.trained_at > NOW() - make_interval(hours => $4::int)
    )
"#;

/// Claim SQL for one job type with an extra live-data predicate on `j`.
fn claim_with_predicate(predicate: &str) -> String {
    format!(
        r#"
        WITH next_job AS (
            SELECT j.id FROM jobs j
            WHERE j.job_type = $1
              AND j.next_run_at <= NOW()
              AND (j.running_since IS NULL
                   OR j.running_since < NOW() - make_interval(secs => $2))
              AND {predicate}
            ORDER BY j.next_run_at
            LIMIT 1
            FOR UPDATE OF j SKIP LOCKED
        )
        UPDATE jobs
        SET running_since = NOW(), updated_at = NOW()
        FROM next_job
        WHERE jobs.id = next_job.id
        RETURNING jobs.*
        "#
    )
}

impl JobStore {
    /// Claim the single row of a singleton job type, creating it if absent.
    ///
    /// An absent row means "run now": the row is inserted already claimed.
    /// If another worker inserts it first, fall back to a normal claim, which
    /// finds that worker's row running and returns `None`.
    pub async fn claim_singleton_job(&self, job_type: JobType) -> Result<Option<Job>, JobError> {
        if !job_type.is_singleton() {
            return Err(JobError::NotSingleton(job_type));
        }

        if let Some(job) = self.claim(Some(job_type)).await? {
            return Ok(Some(job));
        }

        let payload = JobPayload::for_reference(job_type, Uuid::nil());
        let created = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (id, job_type, reference_id, payload, next_run_at, running_since)
            VALUES ($1, $2, NULL, $3, NOW(), NOW())
            ON CONFLICT (job_type) WHERE reference_id IS NULL DO NOTHING
            RETURNING *
            "#,
        )
        .bind(JobId::new())
        .bind(job_type)
        .bind(payload.to_json()?)
        .fetch_optional(self.pool())
        .await?;

        match created {
            Some(job) => {
                info!(job_id = %job.id, job_type = %job_type, "singleton job created");
                Ok(Some(job))
            }
            None => self.claim(Some(job_type)).await,
        }
    }

    /// Claim a due fetch task whose feed still has an active subscriber.
    pub async fn claim_feed_job(&self) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>(&claim_with_predicate(FEED_HAS_ACTIVE_SUBSCRIBER))
            .bind(JobType::FetchFeed)
            .bind(self.stale_after_secs())
            .fetch_optional(self.pool())
            .await?;

        if job.is_some() {
            return Ok(job);
        }

        let discovered = discover_feeds(self.pool()).await?;
        self.insert_discovered(JobType::FetchFeed, discovered).await?;
        Ok(None)
    }

    /// Claim a training task for a user with enough signals and a stale model.
    pub async fn claim_score_training_job(&self) -> Result<Option<Job>, JobError> {
        let job = sqlx::query_as::<_, Job>(&claim_with_predicate(USER_NEEDS_SCORE_MODEL))
            .bind(JobType::TrainScoreModel)
            .bind(self.stale_after_secs())
            .bind(MIN_SCORE_SIGNALS)
            .bind(SCORE_MODEL_MAX_AGE_HOURS as i32)
            .fetch_optional(self.pool())
            .await?;

        if job.is_some() {
            return Ok(job);
        }

        let discovered = discover_score_training_users(self.pool()).await?;
        self.insert_discovered(JobType::TrainScoreModel, discovered).await?;
        Ok(None)
    }

    /// Insert unclaimed, due-now rows for newly qualifying entities.
    async fn insert_discovered(
        &self,
        job_type: JobType,
        reference_ids: Vec<Uuid>,
    ) -> Result<u64, JobError> {
        if reference_ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = reference_ids.iter().map(|_| Uuid::now_v7()).collect();
        let payloads = reference_ids
            .iter()
            .map(|reference_id| JobPayload::for_reference(job_type, *reference_id).to_json())
            .collect::<Result<Vec<_>, _>>()?;

        let result = sqlx::query(
            r#"
            INSERT INTO jobs (id, job_type, reference_id, payload, next_run_at)
            SELECT id, $1::job_type, reference_id, payload, NOW()
            FROM UNNEST($2::uuid[], $3::uuid[], $4::jsonb[]) AS d(id, reference_id, payload)
            ON CONFLICT (job_type, reference_id) WHERE reference_id IS NOT NULL DO NOTHING
            "#,
        )
        .bind(job_type)
        .bind(&ids)
        .bind(&reference_ids)
        .bind(&payloads)
        .execute(self.pool())
        .await?;

        let inserted = result.rows_affected();
        if inserted > 0 {
            info!(job_type = %job_type, count = inserted, "discovered newly eligible jobs");
        }
        Ok(inserted)
    }
}

/// Feeds with an active subscriber but no fetch task yet.
async fn discover_feeds(pool: &PgPool) -> Result<Vec<Uuid>, JobError> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT s.feed_id FROM subscriptions s
        WHERE s.unsubscribed_at IS NULL
          AND NOT EXISTS (
              SELECT 1 FROM jobs j
              WHERE j.job_type = $1 AND j.reference_id = s.feed_id
          )
        LIMIT $2
        "#,
    )
    .bind(JobType::FetchFeed)
    .bind(DISCOVERY_BATCH)
    .fetch_all(pool)
    .await?;

    debug!(count = rows.len(), "feed discovery pass");
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Users with enough signals, no fresh model and no training task yet.
///
/// Mirrors `USER_NEEDS_SCORE_MODEL` so discovery never creates a row the
/// claim predicate would skip.
async fn discover_score_training_users(pool: &PgPool) -> Result<Vec<Uuid>, JobError> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT sig.user_id FROM user_score_signals sig
        WHERE NOT EXISTS (
            SELECT 1 FROM jobs j
            WHERE j.job_type = $1 AND j.reference_id = sig.user_id
        )
          AND NOT EXISTS (
            SELECT 1 FROM user_score_models m
            WHERE m.user_id = sig.user_id
              AND m.trained_at > NOW() - make_interval(hours => $4::int)
        )
        GROUP BY sig.user_id
        HAVING COUNT(*) >= $2
        LIMIT $3
        "#,
    )
    .bind(JobType::TrainScoreModel)
    .bind(MIN_SCORE_SIGNALS)
    .bind(DISCOVERY_BATCH)
    .bind(SCORE_MODEL_MAX_AGE_HOURS as i32)
    .fetch_all(pool)
    .await?;

    debug!(count = rows.len(), "score training discovery pass");
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
