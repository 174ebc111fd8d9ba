//! Permanent-redirect state machine.
//!
//! A feed is either not tracking a redirect, or tracking one target since a
//! first-seen instant. A target seen continuously for the grace period is
//! applied. HTTP to HTTPS upgrades of the same resource apply at once.

use chrono::{DateTime, Duration, Utc};
use url::Url;

pub fn redirect_grace_period() -> Duration {
    Duration::days(7)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyReason {
    HttpsUpgrade,
    GracePeriodElapsed,
    /// The origin returned 404/410 while a redirect was tracked.
    OriginGone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Nothing observed, nothing tracked.
    NoRedirect,
    /// A tracked redirect was not observed this time.
    ClearTracking,
    /// New or different target: (re)start the grace clock now.
    StartTracking { target: String },
    /// Same target, grace period still running.
    Waiting {
        target: String,
        apply_at: DateTime<Utc>,
    },
    Apply { target: String, reason: ApplyReason },
}

/// Decide what an observed redirect target means for a feed.
///
/// `observed` is the durable end of this fetch's redirect chain. A target
/// equal to the feed's own URL counts as no redirect.
pub fn decide(
    feed_url: &str,
    tracked: Option<(&str, DateTime<Utc>)>,
    observed: Option<&str>,
    now: DateTime<Utc>,
) -> RedirectDecision {
    let observed = observed.filter(|target| !same_url(feed_url, target));

    let Some(target) = observed else {
        return match tracked {
            Some(_) => RedirectDecision::ClearTracking,
            None => RedirectDecision::NoRedirect,
        };
    };

    if is_https_upgrade(feed_url, target) {
        return RedirectDecision::Apply {
            target: target.to_string(),
            reason: ApplyReason::HttpsUpgrade,
        };
    }

    match tracked {
        Some((tracked_url, first_seen)) if same_url(tracked_url, target) => {
            let apply_at = first_seen + redirect_grace_period();
            if now >= apply_at {
                RedirectDecision::Apply {
                    target: target.to_string(),
                    reason: ApplyReason::GracePeriodElapsed,
                }
            } else {
                RedirectDecision::Waiting {
                    target: target.to_string(),
                    apply_at,
                }
            }
        }
        _ => RedirectDecision::StartTracking {
            target: target.to_string(),
        },
    }
}

/// On 404/410 a tracked redirect is applied without waiting.
pub fn decide_on_missing(tracked: Option<(&str, DateTime<Utc>)>) -> Option<RedirectDecision> {
    tracked.map(|(target, _)| RedirectDecision::Apply {
        target: target.to_string(),
        reason: ApplyReason::OriginGone,
    })
}

/// `http://host/path?q` to `https://host/path?q`, nothing else changed.
pub fn is_https_upgrade(from: &str, to: &str) -> bool {
    let (Ok(from), Ok(to)) = (Url::parse(from), Url::parse(to)) else {
        return false;
    };

    from.scheme() == "http"
        && to.scheme() == "https"
        && from.host_str().map(str::to_ascii_lowercase) == to.host_str().map(str::to_ascii_lowercase)
        && from.path() == to.path()
        && from.query() == to.query()
        && explicit_port_matches(&from, &to)
}

/// Default ports are equivalent across the upgrade; explicit ones must match.
fn explicit_port_matches(from: &Url, to: &Url) -> bool {
    match (from.port(), to.port()) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
