//! Per-user score model training.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{info, warn};

use crate::common::UserId;
use crate::kernel::jobs::{calculate_backoff, JobOutcome};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub signal_count: u32,
}

pub fn retrain_interval() -> Duration {
    Duration::hours(24)
}

pub async fn train_score_model(
    user_id: UserId,
    consecutive_failures: i32,
    deps: &ServerDeps,
) -> Result<JobOutcome> {
    let now = Utc::now();

    match deps.score_trainer.train(user_id).await {
        Ok(summary) => {
            info!(user_id = %user_id, signal_count = summary.signal_count, "score model trained");
            Ok(JobOutcome::success(now + retrain_interval())
                .with_metadata(json!({ "signal_count": summary.signal_count })))
        }
        Err(e) => {
            let next = now + calculate_backoff(consecutive_failures + 1);
            warn!(user_id = %user_id, error = %e, next_run_at = %next, "score model training failed");
            Ok(JobOutcome::failure(next, format!("{:#}", e)))
        }
    }
}
