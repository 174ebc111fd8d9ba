use chrono::Duration;

/// First retry delay after a failure.
pub fn backoff_base() -> Duration {
    Duration::minutes(30)
}

/// Ceiling for the failure backoff curve.
pub fn backoff_max() -> Duration {
    Duration::days(7)
}

/// Delay after a handler fails in a way it did not classify itself.
pub fn handler_failure_backoff() -> Duration {
    Duration::minutes(1)
}

/// Exponential backoff for `consecutive_failures` failures in a row.
///
/// `30m * 2^(n-1)`, capped at seven days. Non-decreasing in `n`; counts of
/// zero or below return the base delay.
pub fn calculate_backoff(consecutive_failures: i32) -> Duration {
    let exponent = (consecutive_failures.max(1) - 1).min(16) as u32;
    let delay = backoff_base() * 2_i32.pow(exponent);
    delay.min(backoff_max())
}
