//! Job model: one row per logical recurring task.
//!
//! A job row is never "a single execution". Executions update the row in
//! place (claim sets `running_since`, finish clears it and moves `next_run_at`),
//! so the row carries the task's schedule and its failure history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use super::error::JobError;
use crate::common::{FeedId, ImportId, JobId, UserId};

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FetchFeed,
    RenewWebsubSubscriptions,
    ProcessImport,
    TrainScoreModel,
}

impl JobType {
    pub const ALL: [JobType; 4] = [
        JobType::FetchFeed,
        JobType::RenewWebsubSubscriptions,
        JobType::ProcessImport,
        JobType::TrainScoreModel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::FetchFeed => "fetch_feed",
            JobType::RenewWebsubSubscriptions => "renew_websub_subscriptions",
            JobType::ProcessImport => "process_import",
            JobType::TrainScoreModel => "train_score_model",
        }
    }

    /// Singleton types have exactly one row and no reference entity.
    pub fn is_singleton(&self) -> bool {
        matches!(self, JobType::RenewWebsubSubscriptions)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| JobError::UnknownJobType(s.to_string()))
    }
}

// ============================================================================
// Payload
// ============================================================================

/// Typed task payload. Serialized into `jobs.payload` with a `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    FetchFeed { feed_id: FeedId },
    RenewWebsubSubscriptions,
    ProcessImport { import_id: ImportId },
    TrainScoreModel { user_id: UserId },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::FetchFeed { .. } => JobType::FetchFeed,
            JobPayload::RenewWebsubSubscriptions => JobType::RenewWebsubSubscriptions,
            JobPayload::ProcessImport { .. } => JobType::ProcessImport,
            JobPayload::TrainScoreModel { .. } => JobType::TrainScoreModel,
        }
    }

    /// Entity the task is keyed on; `None` for singletons.
    pub fn reference_id(&self) -> Option<Uuid> {
        match self {
            JobPayload::FetchFeed { feed_id } => Some(feed_id.into_uuid()),
            JobPayload::RenewWebsubSubscriptions => None,
            JobPayload::ProcessImport { import_id } => Some(import_id.into_uuid()),
            JobPayload::TrainScoreModel { user_id } => Some(user_id.into_uuid()),
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, JobError> {
        serde_json::to_value(self).map_err(JobError::InvalidPayload)
    }

    /// Builds the payload a discovery pass writes for a derived row.
    pub fn for_reference(job_type: JobType, reference_id: Uuid) -> Self {
        match job_type {
            JobType::FetchFeed => JobPayload::FetchFeed {
                feed_id: FeedId::from_uuid(reference_id),
            },
            JobType::ProcessImport => JobPayload::ProcessImport {
                import_id: ImportId::from_uuid(reference_id),
            },
            JobType::TrainScoreModel => JobPayload::TrainScoreModel {
                user_id: UserId::from_uuid(reference_id),
            },
            JobType::RenewWebsubSubscriptions => JobPayload::RenewWebsubSubscriptions,
        }
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    pub reference_id: Option<Uuid>,
    pub payload: serde_json::Value,

    // Scheduling
    pub next_run_at: DateTime<Utc>,
    pub running_since: Option<DateTime<Utc>>,

    // Execution history
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Decode the JSON payload into its typed form.
    pub fn payload(&self) -> Result<JobPayload, JobError> {
        let payload: JobPayload =
            serde_json::from_value(self.payload.clone()).map_err(JobError::InvalidPayload)?;
        if payload.job_type() != self.job_type {
            return Err(JobError::PayloadMismatch {
                job_type: self.job_type,
                payload_type: payload.job_type(),
            });
        }
        Ok(payload)
    }

    pub fn is_claimed(&self) -> bool {
        self.running_since.is_some()
    }
}

/// Insert request for a job row.
#[derive(Debug, Clone, TypedBuilder)]
pub struct NewJob {
    pub payload: JobPayload,
    /// Defaults to now.
    #[builder(default, setter(strip_option))]
    pub next_run_at: Option<DateTime<Utc>>,
}

impl From<JobPayload> for NewJob {
    fn from(payload: JobPayload) -> Self {
        NewJob::builder().payload(payload).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_by_type() {
        let feed_id = FeedId::new();
        let json = serde_json::to_value(JobPayload::FetchFeed { feed_id }).unwrap();
        assert_eq!(json["type"], "fetch_feed");
        assert_eq!(json["feed_id"], feed_id.to_string());
    }

    #[test]
    fn singleton_payload_serializes_to_tag_only() {
        let json = serde_json::to_value(JobPayload::RenewWebsubSubscriptions).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "renew_websub_subscriptions" }));
    }

    #[test]
    fn payload_reference_matches_entity() {
        let import_id = ImportId::new();
        let payload = JobPayload::ProcessImport { import_id };
        assert_eq!(payload.reference_id(), Some(import_id.into_uuid()));
        assert_eq!(JobPayload::RenewWebsubSubscriptions.reference_id(), None);
    }

    #[test]
    fn discovery_payload_rebuilds_from_reference() {
        let user_id = UserId::new();
        let payload = JobPayload::for_reference(JobType::TrainScoreModel, user_id.into_uuid());
        assert_eq!(payload, JobPayload::TrainScoreModel { user_id });
    }

    #[test]
    fn job_type_parses_from_column_name() {
        for job_type in JobType::ALL {
            assert_eq!(job_type.as_str().parse::<JobType>().unwrap(), job_type);
        }
        assert!("send_email".parse::<JobType>().is_err());
    }

    #[test]
    fn mismatched_payload_is_rejected() {
        let now = Utc::now();
        let job = Job {
            id: JobId::new(),
            job_type: JobType::FetchFeed,
            reference_id: None,
            payload: serde_json::json!({ "type": "renew_websub_subscriptions" }),
            next_run_at: now,
            running_since: None,
            last_run_at: None,
            last_error: None,
            consecutive_failures: 0,
            created_at: now,
            updated_at: now,
        };
        assert!(matches!(job.payload(), Err(JobError::PayloadMismatch { .. })));
    }

    #[test]
    fn new_job_defaults_to_run_now() {
        let job = NewJob::from(JobPayload::RenewWebsubSubscriptions);
        assert!(job.next_run_at.is_none());
    }
}
