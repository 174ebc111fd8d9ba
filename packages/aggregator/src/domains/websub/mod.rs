//! WebSub lease renewal singleton.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::kernel::jobs::JobOutcome;
use crate::kernel::ServerDeps;

/// Result reported by the WebSub renewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenewalSummary {
    pub checked: u32,
    pub renewed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
}

pub fn renewal_interval() -> Duration {
    Duration::hours(1)
}

/// Renew leases that expire within the configured window.
///
/// Individual hub failures are counted, not fatal. The singleton runs hourly
/// regardless.
pub async fn renew_subscriptions(deps: &ServerDeps) -> Result<JobOutcome> {
    let summary = deps
        .websub_renewer
        .renew_expiring_subscriptions(deps.websub_renew_hours_before_expiry)
        .await?;

    if summary.failed > 0 {
        warn!(
            checked = summary.checked,
            renewed = summary.renewed,
            failed = summary.failed,
            errors = ?summary.errors,
            "some websub renewals failed"
        );
    } else {
        info!(
            checked = summary.checked,
            renewed = summary.renewed,
            "websub renewal pass complete"
        );
    }

    Ok(JobOutcome::success(Utc::now() + renewal_interval()).with_metadata(json!(summary)))
}
