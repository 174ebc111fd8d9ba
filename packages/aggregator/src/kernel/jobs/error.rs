use thiserror::Error;

use super::job::JobType;
use crate::common::JobId;

/// Errors at the job store boundary.
#[derive(Debug, Error)]
pub enum JobError {
    /// Finish was called for a row that no longer exists.
    #[error("job {0} not found")]
    TaskNotFound(JobId),

    /// The claim went stale and another worker holds the row now.
    #[error("job {0} was reclaimed by another worker")]
    ClaimLost(JobId),

    #[error("{0} is not a singleton job type")]
    NotSingleton(JobType),

    #[error("unknown job type: {0}")]
    UnknownJobType(String),

    #[error("invalid job payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("payload for {payload_type} stored on a {job_type} job")]
    PayloadMismatch {
        job_type: JobType,
        payload_type: JobType,
    },

    #[error("job store error: {0}")]
    Database(#[from] sqlx::Error),
}
