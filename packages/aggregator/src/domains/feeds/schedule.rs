//! Next-fetch time calculation.

use chrono::{DateTime, Duration, Utc};

use super::fetch_outcome::CacheHeaders;
use super::parsed::TtlHints;
use crate::kernel::jobs::{backoff_max, calculate_backoff};

pub fn default_interval() -> Duration {
    Duration::minutes(60)
}

pub fn min_interval() -> Duration {
    Duration::minutes(10)
}

pub fn max_interval() -> Duration {
    Duration::hours(24)
}

/// Feeds with a live WebSub subscription get pushes; polling is a safety net.
pub fn websub_poll_interval() -> Duration {
    Duration::hours(24)
}

/// 404/410: wait long, but keep the task alive.
pub fn permanent_error_backoff() -> Duration {
    Duration::days(7)
}

/// Polling interval a feed declares about itself, in minutes.
///
/// `<ttl>` wins over syndication hints.
pub fn feed_declared_interval(hints: &TtlHints) -> Option<i32> {
    if let Some(ttl) = hints.ttl_minutes.filter(|ttl| *ttl > 0) {
        return Some(ttl);
    }

    let period_minutes = match hints.update_period.as_deref()?.trim() {
        "hourly" => 60,
        "daily" => 24 * 60,
        "weekly" => 7 * 24 * 60,
        "monthly" => 30 * 24 * 60,
        "yearly" => 365 * 24 * 60,
        _ => return None,
    };
    let frequency = hints.update_frequency.unwrap_or(1).max(1);
    Some((period_minutes / frequency).max(1))
}

/// Next fetch after a successful or not-modified response.
///
/// Most specific hint wins: `max-age`, then `Expires`, then the feed's own
/// declared interval, then the default. The result is clamped.
pub fn next_fetch_after_success(
    now: DateTime<Utc>,
    cache: &CacheHeaders,
    declared_minutes: Option<i32>,
    websub_active: bool,
) -> DateTime<Utc> {
    let interval = cache
        .max_age
        .or_else(|| cache.expires.map(|expires| expires - now))
        .or_else(|| declared_minutes.map(|minutes| Duration::minutes(minutes.into())))
        .unwrap_or_else(default_interval);

    let mut interval = interval.clamp(min_interval(), max_interval());
    if websub_active {
        interval = interval.max(websub_poll_interval());
    }

    now + interval
}

/// Next fetch after a transient failure.
///
/// `consecutive_failures` already includes the failure being recorded. A
/// `Retry-After` longer than the backoff is honored up to the backoff ceiling.
pub fn next_fetch_after_failure(
    now: DateTime<Utc>,
    consecutive_failures: i32,
    retry_after: Option<Duration>,
) -> DateTime<Utc> {
    let backoff = calculate_backoff(consecutive_failures);
    let delay = match retry_after {
        Some(retry_after) => backoff.max(retry_after).min(backoff_max()),
        None => backoff,
    };
    now + delay
}
