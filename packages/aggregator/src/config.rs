use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Worker configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub worker_concurrency: usize,
    pub worker_poll_interval: Duration,
    pub job_stale_after: Duration,
    pub fetch_timeout: Duration,
    pub fetch_user_agent: String,
    pub websub_renew_hours_before_expiry: i64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            worker_concurrency: parse_or("WORKER_CONCURRENCY", 10)?,
            worker_poll_interval: Duration::from_secs(parse_or("WORKER_POLL_INTERVAL_SECS", 5)?),
            job_stale_after: Duration::from_secs(parse_or("JOB_STALE_AFTER_SECS", 300)?),
            fetch_timeout: Duration::from_secs(parse_or("FETCH_TIMEOUT_SECS", 30)?),
            fetch_user_agent: env::var("FETCH_USER_AGENT")
                .unwrap_or_else(|_| format!("feed-aggregator/{}", env!("CARGO_PKG_VERSION"))),
            websub_renew_hours_before_expiry: parse_or("WEBSUB_RENEW_HOURS_BEFORE_EXPIRY", 24)?,
        })
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}
