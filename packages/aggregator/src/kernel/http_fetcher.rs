//! HTTP feed fetcher.
//!
//! This implementation:
//! - Sends conditional requests (`If-None-Match` / `If-Modified-Since`)
//! - Follows redirects itself so every hop and its status is recorded
//! - Reports transport failures as `FetchOutcome` variants, never as `Err`
//! - Reads `Cache-Control: max-age`, `Expires` and `Retry-After`

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{
    HeaderMap, ACCEPT, CACHE_CONTROL, ETAG, EXPIRES, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    LAST_MODIFIED, LOCATION, RETRY_AFTER,
};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::domains::feeds::{CacheHeaders, FetchOutcome, FetchRequest, RedirectHop};
use crate::kernel::BaseFeedFetcher;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/feed+json, application/xml;q=0.9, text/xml;q=0.8, */*;q=0.5";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Feed fetcher over reqwest
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout: std::time::Duration, user_agent: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }

    async fn send(&self, url: &str, request: &FetchRequest) -> reqwest::Result<reqwest::Response> {
        let mut builder = self.client.get(url).header(ACCEPT, FEED_ACCEPT);
        if let Some(etag) = &request.etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = &request.last_modified {
            builder = builder.header(IF_MODIFIED_SINCE, last_modified);
        }
        builder.send().await
    }
}

#[async_trait]
impl BaseFeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> anyhow::Result<FetchOutcome> {
        let mut url = request.url.clone();
        let mut hops: Vec<RedirectHop> = Vec::new();

        loop {
            let response = match self.send(&url, request).await {
                Ok(response) => response,
                Err(e) => {
                    return Ok(FetchOutcome::NetworkError {
                        message: e.to_string(),
                    })
                }
            };
            let status = response.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                let Some(next) = redirect_location(&url, response.headers()) else {
                    return Ok(FetchOutcome::NetworkError {
                        message: format!("HTTP {} without a usable Location header", status.as_u16()),
                    });
                };
                hops.push(RedirectHop {
                    status: status.as_u16(),
                    location: next.clone(),
                });
                if hops.len() > MAX_REDIRECTS {
                    return Ok(FetchOutcome::TooManyRedirects { hops });
                }
                debug!(from = %url, to = %next, status = status.as_u16(), "following redirect");
                url = next;
                continue;
            }

            let now = Utc::now();
            let cache = cache_headers(response.headers(), now);

            let outcome = match status.as_u16() {
                304 => FetchOutcome::NotModified {
                    cache,
                    redirects: hops,
                },
                200..=299 => match response.bytes().await {
                    Ok(body) => FetchOutcome::Success {
                        body: body.to_vec(),
                        cache,
                        redirects: hops,
                    },
                    Err(e) => FetchOutcome::NetworkError {
                        message: format!("failed to read body: {}", e),
                    },
                },
                429 => FetchOutcome::RateLimited {
                    status: 429,
                    retry_after: retry_after(response.headers(), now),
                },
                code @ 400..=499 => FetchOutcome::ClientError { status: code },
                code => FetchOutcome::ServerError { status: code },
            };

            return Ok(outcome);
        }
    }
}

fn redirect_location(current: &str, headers: &HeaderMap) -> Option<String> {
    let location = headers.get(LOCATION)?.to_str().ok()?;
    let base = Url::parse(current).ok()?;
    base.join(location).ok().map(String::from)
}

fn header_str<'a>(headers: &'a HeaderMap, name: reqwest::header::HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn cache_headers(headers: &HeaderMap, now: DateTime<Utc>) -> CacheHeaders {
    CacheHeaders {
        etag: header_str(headers, ETAG).map(String::from),
        last_modified: header_str(headers, LAST_MODIFIED).map(String::from),
        max_age: header_str(headers, CACHE_CONTROL).and_then(parse_max_age),
        expires: header_str(headers, EXPIRES)
            .and_then(parse_http_date)
            .filter(|expires| *expires > now),
    }
}

/// `max-age` from a `Cache-Control` value. `no-store`/`no-cache` yield nothing.
pub fn parse_max_age(value: &str) -> Option<Duration> {
    let directives: Vec<String> = value
        .split(',')
        .map(|d| d.trim().to_ascii_lowercase())
        .collect();

    if directives.iter().any(|d| d == "no-store" || d == "no-cache") {
        return None;
    }

    directives.iter().find_map(|d| {
        let seconds = d.strip_prefix("max-age=")?.trim_matches('"');
        seconds.parse::<i64>().ok().and_then(Duration::try_seconds)
    })
}

/// RFC 7231 HTTP-date (the IMF-fixdate form).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.with_timezone(&Utc))
}

fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    header_str(headers, RETRY_AFTER).and_then(|value| parse_retry_after(value, now))
}

/// `Retry-After` as delta-seconds or an HTTP-date.
///
/// Values too large to represent are treated as absent.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    if let Ok(seconds) = value.parse::<i64>() {
        return Duration::try_seconds(seconds.max(0));
    }
    parse_http_date(value).map(|at| (at - now).max(Duration::zero()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_is_read_from_cache_control() {
        assert_eq!(parse_max_age("public, max-age=900"), Some(Duration::seconds(900)));
        assert_eq!(parse_max_age("Max-Age=60"), Some(Duration::seconds(60)));
        assert_eq!(parse_max_age("public"), None);
    }

    #[test]
    fn out_of_range_header_values_are_ignored() {
        let now: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        assert_eq!(parse_max_age("max-age=99999999999999999"), None);
        assert_eq!(parse_max_age("max-age=99999999999999999999999"), None);
        assert_eq!(parse_retry_after("99999999999999999", now), None);
    }

    #[test]
    fn no_cache_disables_max_age() {
        assert_eq!(parse_max_age("no-cache, max-age=900"), None);
        assert_eq!(parse_max_age("no-store"), None);
    }

    #[test]
    fn http_dates_parse() {
        let date = parse_http_date("Sun, 01 Mar 2026 12:00:00 GMT").unwrap();
        assert_eq!(date, "2026-03-01T12:00:00Z".parse::<DateTime<Utc>>().unwrap());
        assert!(parse_http_date("tomorrow").is_none());
    }

    #[test]
    fn retry_after_accepts_seconds_and_dates() {
        let now: DateTime<Utc> = "2026-03-01T12:00:00Z".parse().unwrap();
        assert_eq!(parse_retry_after("120", now), Some(Duration::minutes(2)));
        assert_eq!(
            parse_retry_after("Sun, 01 Mar 2026 13:00:00 GMT", now),
            Some(Duration::hours(1))
        );
        assert_eq!(
            parse_retry_after("Sun, 01 Mar 2026 11:00:00 GMT", now),
            Some(Duration::zero())
        );
    }

    #[test]
    fn relative_locations_resolve_against_current_url() {
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, "/new/feed.xml".parse().unwrap());
        assert_eq!(
            redirect_location("https://blog.example/old/feed.xml", &headers).as_deref(),
            Some("https://blog.example/new/feed.xml")
        );
    }
}
