//! Integration tests for permanent-redirect tracking and subscription migration.

mod common;

use chrono::{Duration, Utc};
use test_context::test_context;

use aggregator_core::common::FeedId;
use aggregator_core::domains::feeds::actions::{apply_redirect, fetch_feed, RedirectApplied};
use aggregator_core::domains::feeds::models::{Entry, Feed, Subscription};
use aggregator_core::domains::feeds::redirect::ApplyReason;
use aggregator_core::kernel::test_dependencies::MockFeedFetcher;
use aggregator_core::kernel::TestDependencies;
use common::{
    create_subscribed_feed, create_test_feed, create_test_user, set_redirect_tracking, TestHarness,
};

const OLD_URL: &str = "https://old.example/feed.xml";
const NEW_URL: &str = "https://new.example/feed.xml";
const BODY: &str = "<rss><channel><title>Moved</title></channel></rss>";

async fn reload(ctx: &TestHarness, feed_id: FeedId) -> Feed {
    Feed::find_by_id(feed_id, &ctx.db_pool).await.unwrap().unwrap()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn first_permanent_redirect_starts_tracking(ctx: &TestHarness) {
    let (feed, _) = create_subscribed_feed(&ctx.db_pool, OLD_URL).await.unwrap();
    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_permanent_redirect(OLD_URL, NEW_URL, BODY))
        .into_deps(ctx.db_pool.clone());

    let before = Utc::now();
    let outcome = fetch_feed(feed.id, &deps).await.unwrap();
    assert!(outcome.success);

    let refreshed = reload(ctx, feed.id).await;
    assert_eq!(refreshed.url, OLD_URL, "the URL must not change on first sight");
    assert_eq!(refreshed.redirect_url.as_deref(), Some(NEW_URL));
    assert!(refreshed.redirect_first_seen_at.unwrap() >= before - Duration::seconds(1));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn redirect_inside_grace_period_keeps_waiting(ctx: &TestHarness) {
    let (feed, _) = create_subscribed_feed(&ctx.db_pool, OLD_URL).await.unwrap();
    let first_seen = Utc::now() - Duration::days(6);
    set_redirect_tracking(&ctx.db_pool, feed.id, NEW_URL, first_seen)
        .await
        .unwrap();

    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_permanent_redirect(OLD_URL, NEW_URL, BODY))
        .into_deps(ctx.db_pool.clone());
    fetch_feed(feed.id, &deps).await.unwrap();

    let refreshed = reload(ctx, feed.id).await;
    assert_eq!(refreshed.url, OLD_URL);
    assert_eq!(refreshed.redirect_url.as_deref(), Some(NEW_URL));
    let kept = refreshed.redirect_first_seen_at.unwrap();
    assert!((kept - first_seen).num_seconds().abs() <= 1, "grace clock must not restart");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn redirect_past_grace_period_rewrites_the_url(ctx: &TestHarness) {
    let (feed, _) = create_subscribed_feed(&ctx.db_pool, OLD_URL).await.unwrap();
    set_redirect_tracking(&ctx.db_pool, feed.id, NEW_URL, Utc::now() - Duration::days(8))
        .await
        .unwrap();

    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_permanent_redirect(OLD_URL, NEW_URL, BODY))
        .into_deps(ctx.db_pool.clone());
    let outcome = fetch_feed(feed.id, &deps).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.metadata.unwrap()["redirect"]["applied"], "rewritten");

    let refreshed = reload(ctx, feed.id).await;
    assert_eq!(refreshed.url, NEW_URL);
    assert!(refreshed.redirect_url.is_none());
    assert!(refreshed.redirect_first_seen_at.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn changed_target_restarts_the_clock(ctx: &TestHarness) {
    let (feed, _) = create_subscribed_feed(&ctx.db_pool, OLD_URL).await.unwrap();
    set_redirect_tracking(
        &ctx.db_pool,
        feed.id,
        "https://elsewhere.example/feed.xml",
        Utc::now() - Duration::days(10),
    )
    .await
    .unwrap();

    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_permanent_redirect(OLD_URL, NEW_URL, BODY))
        .into_deps(ctx.db_pool.clone());
    fetch_feed(feed.id, &deps).await.unwrap();

    let refreshed = reload(ctx, feed.id).await;
    assert_eq!(refreshed.url, OLD_URL);
    assert_eq!(refreshed.redirect_url.as_deref(), Some(NEW_URL));
    assert!(refreshed.redirect_first_seen_at.unwrap() > Utc::now() - Duration::minutes(1));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn vanished_redirect_clears_tracking(ctx: &TestHarness) {
    let (feed, _) = create_subscribed_feed(&ctx.db_pool, OLD_URL).await.unwrap();
    set_redirect_tracking(&ctx.db_pool, feed.id, NEW_URL, Utc::now() - Duration::days(3))
        .await
        .unwrap();

    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_body(OLD_URL, BODY))
        .into_deps(ctx.db_pool.clone());
    fetch_feed(feed.id, &deps).await.unwrap();

    let refreshed = reload(ctx, feed.id).await;
    assert_eq!(refreshed.url, OLD_URL);
    assert!(refreshed.redirect_url.is_none());
    assert!(refreshed.redirect_first_seen_at.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn https_upgrade_applies_immediately(ctx: &TestHarness) {
    let http_url = "http://blog.example/feed.xml";
    let https_url = "https://blog.example/feed.xml";
    let (feed, _) = create_subscribed_feed(&ctx.db_pool, http_url).await.unwrap();

    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_permanent_redirect(http_url, https_url, BODY))
        .into_deps(ctx.db_pool.clone());
    fetch_feed(feed.id, &deps).await.unwrap();

    let refreshed = reload(ctx, feed.id).await;
    assert_eq!(refreshed.url, https_url);
    assert!(refreshed.redirect_url.is_none());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn redirect_onto_existing_feed_merges_subscribers(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let jobs = ctx.jobs();

    let old_feed = create_test_feed(pool, OLD_URL).await.unwrap();
    let new_feed = create_test_feed(pool, NEW_URL).await.unwrap();

    // reader subscribes only to the old feed; both_user follows both already
    let reader = create_test_user(pool).await.unwrap();
    let both_user = create_test_user(pool).await.unwrap();
    Subscription::subscribe(reader, old_feed.id, pool).await.unwrap();
    Subscription::subscribe(both_user, old_feed.id, pool).await.unwrap();
    Subscription::subscribe(both_user, new_feed.id, pool).await.unwrap();

    let shared = Entry::create(old_feed.id, "post-1", Some("Shared"), pool).await.unwrap();
    let only_old = Entry::create(old_feed.id, "post-0", Some("Old only"), pool).await.unwrap();
    let shared_on_new = Entry::create(new_feed.id, "post-1", Some("Shared"), pool).await.unwrap();
    Entry::star(reader, shared.id, pool).await.unwrap();
    Entry::star(reader, only_old.id, pool).await.unwrap();

    jobs.ensure_feed_job(old_feed.id, None).await.unwrap();
    set_redirect_tracking(pool, old_feed.id, NEW_URL, Utc::now() - Duration::days(8))
        .await
        .unwrap();

    let deps = TestDependencies::new()
        .mock_fetcher(MockFeedFetcher::new().with_permanent_redirect(OLD_URL, NEW_URL, BODY))
        .into_deps(pool.clone());
    let outcome = fetch_feed(old_feed.id, &deps).await.unwrap();
    let metadata = outcome.metadata.unwrap();
    assert_eq!(metadata["redirect"]["applied"], "merged");
    assert_eq!(metadata["redirect"]["migrated_subscriptions"], 2);
    assert_eq!(metadata["redirect"]["orphaned_stars"], 1);

    // old subscriptions are soft-deleted, new ones remember where they came from
    let old_sub = Subscription::find(reader, old_feed.id, pool).await.unwrap().unwrap();
    assert!(!old_sub.is_active());
    let moved = Subscription::find(reader, new_feed.id, pool).await.unwrap().unwrap();
    assert!(moved.is_active());
    assert_eq!(moved.previous_feed_ids, vec![old_feed.id]);
    let merged = Subscription::find(both_user, new_feed.id, pool).await.unwrap().unwrap();
    assert_eq!(merged.previous_feed_ids, vec![old_feed.id]);

    // stars follow the GUID onto the target feed
    let starred: Vec<_> = Entry::find_starred(reader, pool)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert!(starred.contains(&shared_on_new.id));

    // the old feed URL is left alone and its job stops being claimable
    assert_eq!(reload(ctx, old_feed.id).await.url, OLD_URL);
    let mut claimed = Vec::new();
    while let Some(job) = jobs.claim_feed_job().await.unwrap() {
        claimed.push(job.reference_id);
    }
    assert_eq!(claimed, vec![Some(new_feed.id.into_uuid())]);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn repeated_merges_accumulate_history(ctx: &TestHarness) {
    let pool = &ctx.db_pool;
    let first = create_test_feed(pool, "https://first.example/feed").await.unwrap();
    let second = create_test_feed(pool, "https://second.example/feed").await.unwrap();
    let third = create_test_feed(pool, "https://third.example/feed").await.unwrap();
    let user = create_test_user(pool).await.unwrap();
    Subscription::subscribe(user, first.id, pool).await.unwrap();

    let deps = TestDependencies::new().into_deps(pool.clone());
    let applied = apply_redirect(&first, &second.url, ApplyReason::GracePeriodElapsed, &deps)
        .await
        .unwrap();
    assert!(matches!(applied, RedirectApplied::Merged { migrated_subscriptions: 1, .. }));

    let second = reload(ctx, second.id).await;
    apply_redirect(&second, &third.url, ApplyReason::OriginGone, &deps)
        .await
        .unwrap();

    let subscription = Subscription::find(user, third.id, pool).await.unwrap().unwrap();
    assert!(subscription.is_active());
    assert_eq!(subscription.previous_feed_ids, vec![first.id, second.id]);
}
