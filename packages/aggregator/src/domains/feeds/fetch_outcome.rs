//! What a fetch attempt can produce.
//!
//! The fetcher reports transport results only; deciding what they mean for
//! the feed row and its schedule is the classifier's job.

use chrono::{DateTime, Duration, Utc};

/// Conditional request for one feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// One redirect hop, in the order the fetcher followed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectHop {
    pub status: u16,
    /// Absolute URL the hop pointed to.
    pub location: String,
}

impl RedirectHop {
    pub fn is_permanent(&self) -> bool {
        matches!(self.status, 301 | 308)
    }
}

/// Where a redirect chain durably ends.
///
/// Only the leading run of permanent hops counts. A temporary hop anywhere
/// ends the durable part, so `301 -> 302 -> 301` resolves to the first target.
pub fn durable_redirect_target(hops: &[RedirectHop]) -> Option<&str> {
    hops.iter()
        .take_while(|hop| hop.is_permanent())
        .last()
        .map(|hop| hop.location.as_str())
}

/// Cache validators and freshness hints from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// `Cache-Control: max-age`
    pub max_age: Option<Duration>,
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success {
        body: Vec<u8>,
        cache: CacheHeaders,
        redirects: Vec<RedirectHop>,
    },
    NotModified {
        cache: CacheHeaders,
        redirects: Vec<RedirectHop>,
    },
    /// A fetcher that does not follow redirects reports the first permanent hop.
    PermanentRedirect { status: u16, location: String },
    ClientError { status: u16 },
    ServerError { status: u16 },
    RateLimited {
        status: u16,
        retry_after: Option<Duration>,
    },
    NetworkError { message: String },
    TooManyRedirects { hops: Vec<RedirectHop> },
}

impl FetchOutcome {
    /// Text recorded as `last_error` when this outcome is a failure.
    pub fn error_message(&self) -> Option<String> {
        match self {
            FetchOutcome::Success { .. }
            | FetchOutcome::NotModified { .. }
            | FetchOutcome::PermanentRedirect { .. } => None,
            FetchOutcome::ClientError { status } | FetchOutcome::ServerError { status } => {
                Some(format!("HTTP {}", status))
            }
            FetchOutcome::RateLimited { status, .. } => Some(format!("HTTP {} (rate limited)", status)),
            FetchOutcome::NetworkError { message } => Some(format!("network error: {}", message)),
            FetchOutcome::TooManyRedirects { hops } => {
                Some(format!("too many redirects ({} hops)", hops.len()))
            }
        }
    }
}
