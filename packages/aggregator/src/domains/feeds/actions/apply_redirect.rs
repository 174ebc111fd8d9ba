//! Redirect migration: tracking updates and the apply step.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::common::{FeedId, UserId};
use crate::domains::feeds::models::{Entry, Feed, Subscription};
use crate::domains::feeds::redirect::{decide, ApplyReason, RedirectDecision};
use crate::kernel::ServerDeps;

/// What applying a redirect did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectApplied {
    /// No feed owned the target URL; the feed now points there.
    Rewritten,
    /// Subscribers moved to the feed that already owned the target URL.
    Merged {
        target_feed_id: FeedId,
        migrated_subscriptions: usize,
        orphaned_stars: i64,
    },
}

/// Feed the redirect observation of one fetch into the state machine.
pub async fn reconcile_redirect(
    feed: &Feed,
    observed: Option<&str>,
    now: DateTime<Utc>,
    deps: &ServerDeps,
) -> Result<Option<RedirectApplied>> {
    let decision = decide(&feed.url, feed.tracked_redirect(), observed, now);
    execute_decision(feed, decision, now, deps).await
}

pub async fn execute_decision(
    feed: &Feed,
    decision: RedirectDecision,
    now: DateTime<Utc>,
    deps: &ServerDeps,
) -> Result<Option<RedirectApplied>> {
    match decision {
        RedirectDecision::NoRedirect => Ok(None),
        RedirectDecision::Waiting { target, apply_at } => {
            info!(feed_id = %feed.id, target = %target, apply_at = %apply_at, "redirect still in grace period");
            Ok(None)
        }
        RedirectDecision::ClearTracking => {
            info!(
                feed_id = %feed.id,
                tracked = ?feed.redirect_url,
                "tracked redirect no longer observed, clearing"
            );
            Feed::clear_redirect_tracking(feed.id, &deps.db_pool).await?;
            Ok(None)
        }
        RedirectDecision::StartTracking { target } => {
            info!(feed_id = %feed.id, from = %feed.url, target = %target, "tracking permanent redirect");
            Feed::track_redirect(feed.id, &target, now, &deps.db_pool).await?;
            Ok(None)
        }
        RedirectDecision::Apply { target, reason } => {
            apply_redirect(feed, &target, reason, deps).await.map(Some)
        }
    }
}

/// Move the feed to `target`.
///
/// If another feed already owns the URL, subscribers are merged into it.
/// Otherwise the URL is rewritten in place; losing that race to a concurrent
/// writer falls back to the merge.
pub async fn apply_redirect(
    feed: &Feed,
    target: &str,
    reason: ApplyReason,
    deps: &ServerDeps,
) -> Result<RedirectApplied> {
    let applied = match Feed::find_by_url(target, &deps.db_pool).await? {
        Some(existing) if existing.id != feed.id => merge_into(feed, &existing, deps).await?,
        _ => match Feed::rewrite_url(feed.id, target, &deps.db_pool).await {
            Ok(()) => RedirectApplied::Rewritten,
            Err(e) if is_unique_violation(&e) => {
                warn!(feed_id = %feed.id, target = %target, "target URL claimed concurrently, merging instead");
                let existing = Feed::find_by_url(target, &deps.db_pool)
                    .await?
                    .with_context(|| format!("feed for {} vanished after unique violation", target))?;
                merge_into(feed, &existing, deps).await?
            }
            Err(e) => return Err(e).context("failed to rewrite feed URL"),
        },
    };

    match &applied {
        RedirectApplied::Rewritten => {
            info!(feed_id = %feed.id, from = %feed.url, to = %target, reason = ?reason, "redirect applied in place");
            deps.jobs.resync_feed_job(feed.id).await?;
        }
        RedirectApplied::Merged {
            target_feed_id,
            migrated_subscriptions,
            orphaned_stars,
        } => {
            info!(
                feed_id = %feed.id,
                target_feed_id = %target_feed_id,
                migrated_subscriptions,
                reason = ?reason,
                "redirect applied by merging subscriptions"
            );
            if *orphaned_stars > 0 {
                warn!(
                    feed_id = %feed.id,
                    target_feed_id = %target_feed_id,
                    orphaned_stars,
                    "starred entries had no GUID match on the target feed"
                );
            }
            deps.jobs.ensure_feed_job(*target_feed_id, None).await?;
            deps.jobs.resync_feed_job(feed.id).await?;
        }
    }

    Ok(applied)
}

async fn merge_into(feed: &Feed, target: &Feed, deps: &ServerDeps) -> Result<RedirectApplied> {
    let mut tx = deps.db_pool.begin().await?;

    let subscriptions = Subscription::lock_active_for_feed(feed.id, &mut tx).await?;
    for subscription in &subscriptions {
        subscription.migrate_to(target.id, &mut tx).await?;
    }

    let user_ids: Vec<UserId> = subscriptions.iter().map(|s| s.user_id).collect();
    let (_, orphaned_stars) = Entry::carry_stars(feed.id, target.id, &user_ids, &mut tx).await?;

    Subscription::unsubscribe_all_for_feed(feed.id, &mut tx).await?;
    Feed::clear_redirect_tracking(feed.id, &mut *tx).await?;

    tx.commit().await?;

    Ok(RedirectApplied::Merged {
        target_feed_id: target.id,
        migrated_subscriptions: subscriptions.len(),
        orphaned_stars,
    })
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}
