//! Tests for the reqwest-backed fetcher against a local axum server.

use std::net::SocketAddr;
use std::time::Duration as StdDuration;

use axum::extract::Path;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Duration;

use aggregator_core::domains::feeds::{durable_redirect_target, FetchOutcome, FetchRequest};
use aggregator_core::kernel::http_fetcher::MAX_REDIRECTS;
use aggregator_core::kernel::{BaseFeedFetcher, HttpFeedFetcher};

const FEED_BODY: &str = "<rss><channel><title>Local</title></channel></rss>";
const ETAG: &str = "\"v1\"";

async fn feed(headers: HeaderMap) -> Response {
    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok());
    if if_none_match == Some(ETAG) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, ETAG)]).into_response();
    }
    (
        [
            (header::ETAG, ETAG),
            (header::CACHE_CONTROL, "public, max-age=600"),
            (header::CONTENT_TYPE, "application/rss+xml"),
        ],
        FEED_BODY,
    )
        .into_response()
}

async fn moved() -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/feed")]).into_response()
}

async fn temporary() -> Response {
    (StatusCode::FOUND, [(header::LOCATION, "/moved")]).into_response()
}

async fn endless(Path(n): Path<u32>) -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, format!("/loop/{}", n + 1))],
    )
        .into_response()
}

async fn slow_down() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, [(header::RETRY_AFTER, "120")]).into_response()
}

async fn spawn_server() -> SocketAddr {
    let app = Router::new()
        .route("/feed", get(feed))
        .route("/moved", get(moved))
        .route("/temporary", get(temporary))
        .route("/loop/:n", get(endless))
        .route("/gone", get(|| async { StatusCode::GONE }))
        .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/slow-down", get(slow_down));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fetcher() -> HttpFeedFetcher {
    HttpFeedFetcher::new(StdDuration::from_secs(5), "aggregator-tests/0.1").unwrap()
}

fn request(url: String) -> FetchRequest {
    FetchRequest {
        url,
        etag: None,
        last_modified: None,
    }
}

#[tokio::test]
async fn success_reports_body_and_cache_headers() {
    let addr = spawn_server().await;

    let outcome = fetcher()
        .fetch(&request(format!("http://{}/feed", addr)))
        .await
        .unwrap();

    match outcome {
        FetchOutcome::Success {
            body,
            cache,
            redirects,
        } => {
            assert_eq!(body, FEED_BODY.as_bytes());
            assert_eq!(cache.etag.as_deref(), Some(ETAG));
            assert_eq!(cache.max_age, Some(Duration::seconds(600)));
            assert!(redirects.is_empty());
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn matching_etag_yields_not_modified() {
    let addr = spawn_server().await;

    let outcome = fetcher()
        .fetch(&FetchRequest {
            url: format!("http://{}/feed", addr),
            etag: Some(ETAG.to_string()),
            last_modified: None,
        })
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::NotModified { .. }));
}

#[tokio::test]
async fn permanent_redirect_hop_is_recorded() {
    let addr = spawn_server().await;
    let target = format!("http://{}/feed", addr);

    let outcome = fetcher()
        .fetch(&request(format!("http://{}/moved", addr)))
        .await
        .unwrap();

    let FetchOutcome::Success { redirects, .. } = outcome else {
        panic!("expected success after redirect");
    };
    assert_eq!(redirects.len(), 1);
    assert_eq!(redirects[0].status, 301);
    assert_eq!(redirects[0].location, target);
    assert_eq!(durable_redirect_target(&redirects), Some(target.as_str()));
}

#[tokio::test]
async fn temporary_hop_first_means_no_durable_target() {
    let addr = spawn_server().await;

    let outcome = fetcher()
        .fetch(&request(format!("http://{}/temporary", addr)))
        .await
        .unwrap();

    let FetchOutcome::Success { redirects, .. } = outcome else {
        panic!("expected success after redirects");
    };
    let statuses: Vec<u16> = redirects.iter().map(|hop| hop.status).collect();
    assert_eq!(statuses, vec![302, 301]);
    assert_eq!(durable_redirect_target(&redirects), None);
}

#[tokio::test]
async fn redirect_loop_stops_after_the_hop_limit() {
    let addr = spawn_server().await;

    let outcome = fetcher()
        .fetch(&request(format!("http://{}/loop/0", addr)))
        .await
        .unwrap();

    match outcome {
        FetchOutcome::TooManyRedirects { hops } => assert_eq!(hops.len(), MAX_REDIRECTS + 1),
        other => panic!("expected too many redirects, got {:?}", other),
    }
}

#[tokio::test]
async fn error_statuses_map_to_outcomes() {
    let addr = spawn_server().await;
    let fetcher = fetcher();

    let gone = fetcher
        .fetch(&request(format!("http://{}/gone", addr)))
        .await
        .unwrap();
    assert_eq!(gone, FetchOutcome::ClientError { status: 410 });

    let down = fetcher
        .fetch(&request(format!("http://{}/down", addr)))
        .await
        .unwrap();
    assert_eq!(down, FetchOutcome::ServerError { status: 503 });

    let missing_route = fetcher
        .fetch(&request(format!("http://{}/nope", addr)))
        .await
        .unwrap();
    assert_eq!(missing_route, FetchOutcome::ClientError { status: 404 });

    let limited = fetcher
        .fetch(&request(format!("http://{}/slow-down", addr)))
        .await
        .unwrap();
    assert_eq!(
        limited,
        FetchOutcome::RateLimited {
            status: 429,
            retry_after: Some(Duration::seconds(120)),
        }
    );
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let outcome = fetcher()
        .fetch(&request(format!("http://{}/feed", addr)))
        .await
        .unwrap();

    assert!(matches!(outcome, FetchOutcome::NetworkError { .. }));
}
