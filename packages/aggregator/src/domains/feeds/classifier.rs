//! Maps a fetch outcome onto what the fetch handler must do next.

use chrono::Duration;

use super::fetch_outcome::{durable_redirect_target, CacheHeaders, FetchOutcome};
use crate::common::utils::body_hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchClassification {
    /// 304, or a 200 whose body hashes to the stored hash. No parse needed.
    Unchanged {
        cache: CacheHeaders,
        redirect_target: Option<String>,
    },
    /// A new body that must be parsed and diffed.
    Changed {
        body: Vec<u8>,
        body_hash: String,
        cache: CacheHeaders,
        redirect_target: Option<String>,
    },
    /// The fetcher stopped at a permanent redirect without fetching the target.
    RedirectObserved { target: String },
    /// 404 or 410.
    PermanentlyMissing { status: u16 },
    /// Anything worth retrying on the backoff curve.
    TransientFailure {
        error: String,
        retry_after: Option<Duration>,
    },
}

pub fn classify(outcome: FetchOutcome, stored_body_hash: Option<&str>) -> FetchClassification {
    let error = outcome.error_message();

    match outcome {
        FetchOutcome::Success {
            body,
            cache,
            redirects,
        } => {
            let redirect_target = durable_redirect_target(&redirects).map(str::to_string);
            let hash = body_hash(&body);
            if stored_body_hash == Some(hash.as_str()) {
                FetchClassification::Unchanged {
                    cache,
                    redirect_target,
                }
            } else {
                FetchClassification::Changed {
                    body,
                    body_hash: hash,
                    cache,
                    redirect_target,
                }
            }
        }
        FetchOutcome::NotModified { cache, redirects } => FetchClassification::Unchanged {
            cache,
            redirect_target: durable_redirect_target(&redirects).map(str::to_string),
        },
        FetchOutcome::PermanentRedirect { location, .. } => {
            FetchClassification::RedirectObserved { target: location }
        }
        FetchOutcome::ClientError { status } if matches!(status, 404 | 410) => {
            FetchClassification::PermanentlyMissing { status }
        }
        FetchOutcome::RateLimited { retry_after, .. } => FetchClassification::TransientFailure {
            error: error.unwrap_or_default(),
            retry_after,
        },
        FetchOutcome::ClientError { .. }
        | FetchOutcome::ServerError { .. }
        | FetchOutcome::NetworkError { .. }
        | FetchOutcome::TooManyRedirects { .. } => FetchClassification::TransientFailure {
            error: error.unwrap_or_default(),
            retry_after: None,
        },
    }
}
