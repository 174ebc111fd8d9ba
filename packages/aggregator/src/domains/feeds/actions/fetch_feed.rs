//! The fetch-feed job handler.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use super::apply_redirect::{execute_decision, reconcile_redirect, RedirectApplied};
use crate::common::FeedId;
use crate::domains::feeds::classifier::{classify, FetchClassification};
use crate::domains::feeds::models::{Feed, FeedContentUpdate};
use crate::domains::feeds::redirect::decide_on_missing;
use crate::domains::feeds::schedule::{
    feed_declared_interval, next_fetch_after_failure, next_fetch_after_success,
    permanent_error_backoff,
};
use crate::domains::feeds::{CacheHeaders, EntryProcessingContext, FetchRequest};
use crate::kernel::jobs::JobOutcome;
use crate::kernel::ServerDeps;

/// Where a task for a deleted entity is parked.
pub fn parked_interval() -> Duration {
    Duration::days(365 * 100)
}

/// Fetch one feed, update its row, and decide when it runs next.
///
/// Fetch, parse and entry-processing failures come back as a failed
/// [`JobOutcome`] on the feed's backoff curve. Only infrastructure errors
/// (the database, a broken fetcher) are returned as `Err`.
pub async fn fetch_feed(feed_id: FeedId, deps: &ServerDeps) -> Result<JobOutcome> {
    let now = Utc::now();

    let Some(feed) = Feed::find_by_id(feed_id, &deps.db_pool).await? else {
        warn!(feed_id = %feed_id, "feed no longer exists, parking its job");
        return Ok(JobOutcome::success(now + parked_interval()));
    };

    let request = FetchRequest {
        url: feed.url.clone(),
        etag: feed.etag.clone(),
        last_modified: feed.last_modified_header.clone(),
    };
    let outcome = deps.fetcher.fetch(&request).await?;

    match classify(outcome, feed.body_hash.as_deref()) {
        FetchClassification::Unchanged {
            cache,
            redirect_target,
        } => {
            let next = next_fetch_after_success(now, &cache, feed.ttl_minutes, feed.websub_active);
            Feed::record_unchanged(feed.id, &cache, now, next, &deps.db_pool).await?;
            debug!(feed_id = %feed.id, next_fetch_at = %next, "feed unchanged");

            let applied = reconcile_redirect(&feed, redirect_target.as_deref(), now, deps).await?;
            Ok(JobOutcome::success(next).with_metadata(json!({
                "changed": false,
                "redirect": redirect_metadata(&applied),
            })))
        }
        FetchClassification::Changed {
            body,
            body_hash,
            cache,
            redirect_target,
        } => {
            let outcome = process_changed_body(&feed, &body, body_hash, &cache, now, deps).await?;
            if outcome.success {
                let applied =
                    reconcile_redirect(&feed, redirect_target.as_deref(), now, deps).await?;
                if let Some(applied) = applied {
                    let mut metadata = outcome.metadata.clone().unwrap_or_else(|| json!({}));
                    metadata["redirect"] = redirect_metadata(&Some(applied));
                    return Ok(outcome.with_metadata(metadata));
                }
            }
            Ok(outcome)
        }
        FetchClassification::RedirectObserved { target } => {
            let next = next_fetch_after_success(
                now,
                &CacheHeaders::default(),
                feed.ttl_minutes,
                feed.websub_active,
            );
            Feed::set_next_fetch_at(feed.id, next, &deps.db_pool).await?;

            let applied = reconcile_redirect(&feed, Some(&target), now, deps).await?;
            Ok(JobOutcome::success(next).with_metadata(json!({
                "redirect": redirect_metadata(&applied),
            })))
        }
        FetchClassification::PermanentlyMissing { status } => {
            if let Some(decision) = decide_on_missing(feed.tracked_redirect()) {
                info!(feed_id = %feed.id, status, "origin gone while tracking a redirect, applying it now");
                let applied = execute_decision(&feed, decision, now, deps).await?;
                let next =
                    next_fetch_after_success(now, &CacheHeaders::default(), None, false);
                Feed::set_next_fetch_at(feed.id, next, &deps.db_pool).await?;
                return Ok(JobOutcome::success(next).with_metadata(json!({
                    "redirect": redirect_metadata(&applied),
                })));
            }

            let error = format!("HTTP {}", status);
            let next = now + permanent_error_backoff();
            let failures = Feed::record_failure(feed.id, &error, now, next, &deps.db_pool).await?;
            warn!(
                feed_id = %feed.id,
                status,
                consecutive_failures = failures,
                next_fetch_at = %next,
                "feed permanently missing, backing off"
            );
            Ok(JobOutcome::failure(next, error))
        }
        FetchClassification::TransientFailure { error, retry_after } => {
            record_transient_failure(&feed, &error, retry_after, now, deps).await
        }
    }
}

async fn process_changed_body(
    feed: &Feed,
    body: &[u8],
    body_hash: String,
    cache: &CacheHeaders,
    now: DateTime<Utc>,
    deps: &ServerDeps,
) -> Result<JobOutcome> {
    let parsed = match deps.parser.parse(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            let error = format!("parse error: {:#}", e);
            return record_transient_failure(feed, &error, None, now, deps).await;
        }
    };

    let context = EntryProcessingContext {
        fetched_at: now,
        previous_update_watermark: feed.last_entries_updated_at,
    };
    let changes = match deps.entry_processor.process(feed.id, &parsed, context).await {
        Ok(changes) => changes,
        Err(e) => {
            let error = format!("entry processing failed: {:#}", e);
            return record_transient_failure(feed, &error, None, now, deps).await;
        }
    };

    let declared = feed_declared_interval(&parsed.ttl);
    let next = next_fetch_after_success(now, cache, declared, feed.websub_active);

    let update = FeedContentUpdate {
        title: parsed.title,
        description: parsed.description,
        site_url: parsed.site_url,
        websub_hub_url: parsed.hub_url,
        websub_self_url: parsed.self_url,
        body_hash,
        ttl_minutes: declared,
        entries_updated_at: changes.has_changes.then_some(now),
    };
    Feed::record_changed(feed.id, &update, cache, now, next, &deps.db_pool).await?;

    info!(
        feed_id = %feed.id,
        new = changes.new_count,
        updated = changes.updated_count,
        disappeared = changes.disappeared_count,
        next_fetch_at = %next,
        "feed refreshed"
    );

    Ok(JobOutcome::success(next).with_metadata(json!({
        "changed": true,
        "entries": changes,
    })))
}

async fn record_transient_failure(
    feed: &Feed,
    error: &str,
    retry_after: Option<Duration>,
    now: DateTime<Utc>,
    deps: &ServerDeps,
) -> Result<JobOutcome> {
    let next = next_fetch_after_failure(now, feed.consecutive_failures + 1, retry_after);
    let failures = Feed::record_failure(feed.id, error, now, next, &deps.db_pool).await?;

    warn!(
        feed_id = %feed.id,
        error = %error,
        consecutive_failures = failures,
        next_fetch_at = %next,
        "feed fetch failed"
    );

    Ok(JobOutcome::failure(next, error))
}

fn redirect_metadata(applied: &Option<RedirectApplied>) -> serde_json::Value {
    match applied {
        None => serde_json::Value::Null,
        Some(RedirectApplied::Rewritten) => json!({ "applied": "rewritten" }),
        Some(RedirectApplied::Merged {
            target_feed_id,
            migrated_subscriptions,
            orphaned_stars,
        }) => json!({
            "applied": "merged",
            "target_feed_id": target_feed_id,
            "migrated_subscriptions": migrated_subscriptions,
            "orphaned_stars": orphaned_stars,
        }),
    }
}
