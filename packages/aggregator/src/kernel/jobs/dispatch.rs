//! Routes claimed jobs to their domain handlers.

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::job::{Job, JobPayload};
use super::store::JobOutcome;
use super::worker::JobHandler;
use crate::domains::feeds::actions::fetch_feed;
use crate::domains::imports::process_import;
use crate::domains::scoring::train_score_model;
use crate::domains::websub::renew_subscriptions;
use crate::kernel::ServerDeps;

pub struct JobDispatcher {
    deps: ServerDeps,
}

impl JobDispatcher {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl JobHandler for JobDispatcher {
    async fn handle(&self, job: &Job) -> Result<JobOutcome> {
        let payload = job.payload()?;
        debug!(job_id = %job.id, job_type = %job.job_type, "dispatching job");

        match payload {
            JobPayload::FetchFeed { feed_id } => fetch_feed(feed_id, &self.deps).await,
            JobPayload::RenewWebsubSubscriptions => renew_subscriptions(&self.deps).await,
            JobPayload::ProcessImport { import_id } => {
                process_import(import_id, job.consecutive_failures, &self.deps).await
            }
            JobPayload::TrainScoreModel { user_id } => {
                train_score_model(user_id, job.consecutive_failures, &self.deps).await
            }
        }
    }
}
