//! One-shot OPML import processing.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::common::{FeedId, ImportId};
use crate::domains::feeds::actions::parked_interval;
use crate::kernel::jobs::{calculate_backoff, JobOutcome};
use crate::kernel::ServerDeps;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Feeds the import subscribed the user to.
    pub feed_ids: Vec<FeedId>,
    pub skipped: u32,
}

/// Run an import, then schedule fetches for the feeds it touched.
///
/// A finished import is parked rather than deleted so the row stays as an
/// audit trail.
pub async fn process_import(
    import_id: ImportId,
    consecutive_failures: i32,
    deps: &ServerDeps,
) -> Result<JobOutcome> {
    let now = Utc::now();

    let summary = match deps.import_processor.process(import_id).await {
        Ok(summary) => summary,
        Err(e) => {
            let next = now + calculate_backoff(consecutive_failures + 1);
            warn!(import_id = %import_id, error = %e, next_run_at = %next, "import failed");
            return Ok(JobOutcome::failure(next, format!("{:#}", e)));
        }
    };

    for feed_id in &summary.feed_ids {
        deps.jobs.ensure_feed_job(*feed_id, None).await?;
    }

    info!(
        import_id = %import_id,
        feeds = summary.feed_ids.len(),
        skipped = summary.skipped,
        "import processed"
    );

    Ok(JobOutcome::success(now + parked_interval()).with_metadata(json!({
        "feeds": summary.feed_ids.len(),
        "skipped": summary.skipped,
    })))
}
