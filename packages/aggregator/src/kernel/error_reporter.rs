use async_trait::async_trait;
use tracing::error;

use crate::kernel::{BaseErrorReporter, JobErrorContext};

/// Reports handler defects as structured `error` events.
///
/// Deployments with an external sink wrap or replace this.
pub struct TracingErrorReporter;

#[async_trait]
impl BaseErrorReporter for TracingErrorReporter {
    async fn report(&self, error: &anyhow::Error, context: JobErrorContext) {
        error!(
            target: "aggregator_core::error_report",
            job_id = %context.job_id,
            job_type = %context.job_type,
            consecutive_failures = context.consecutive_failures,
            error = ?error,
            "job handler defect"
        );
    }
}
