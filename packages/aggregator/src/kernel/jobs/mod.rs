//! Persistent job queue: store, claim engine, eligibility and worker loop.

pub mod backoff;
pub mod dispatch;
pub mod eligibility;
pub mod error;
pub mod job;
pub mod store;
pub mod worker;

pub use backoff::*;
pub use dispatch::JobDispatcher;
pub use eligibility::{MIN_SCORE_SIGNALS, SCORE_MODEL_MAX_AGE_HOURS};
pub use error::JobError;
pub use job::{Job, JobPayload, JobType, NewJob};
pub use store::{JobOutcome, JobStore, DEFAULT_STALE_AFTER};
pub use worker::{ClaimSource, JobHandler, JobWorker, JobWorkerConfig, StoreClaimSource};
