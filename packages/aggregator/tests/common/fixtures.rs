//! Test fixtures for creating test data.
//!
//! Rows outside the scheduling core (users, signals, models) are inserted with
//! raw SQL; feeds and subscriptions go through the model methods.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use aggregator_core::common::{EntryId, FeedId, JobId, UserId};
use aggregator_core::domains::feeds::models::{Feed, Subscription};

pub async fn create_test_user(pool: &PgPool) -> Result<UserId> {
    let id = UserId::new();
    sqlx::query("INSERT INTO users (id, email) VALUES ($1, $2)")
        .bind(id)
        .bind(format!("{}@example.com", id))
        .execute(pool)
        .await?;
    Ok(id)
}

pub async fn create_test_feed(pool: &PgPool, url: &str) -> Result<Feed> {
    Feed::find_or_create(url, pool).await
}

/// Create a feed with one active subscriber
pub async fn create_subscribed_feed(pool: &PgPool, url: &str) -> Result<(Feed, UserId)> {
    let feed = create_test_feed(pool, url).await?;
    let user_id = create_test_user(pool).await?;
    Subscription::subscribe(user_id, feed.id, pool).await?;
    Ok((feed, user_id))
}

pub async fn add_score_signals(pool: &PgPool, user_id: UserId, feed_id: FeedId, count: usize) -> Result<()> {
    for i in 0..count {
        let entry_id = EntryId::new();
        sqlx::query("INSERT INTO entries (id, feed_id, guid) VALUES ($1, $2, $3)")
            .bind(entry_id)
            .bind(feed_id)
            .bind(format!("signal-{}-{}", user_id, i))
            .execute(pool)
            .await?;
        sqlx::query(
            "INSERT INTO user_score_signals (id, user_id, entry_id, score) VALUES ($1, $2, $3, 1)",
        )
        .bind(uuid::Uuid::now_v7())
        .bind(user_id)
        .bind(entry_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn record_trained_model(pool: &PgPool, user_id: UserId, trained_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO user_score_models (user_id, trained_at, signal_count) VALUES ($1, $2, 20)
        ON CONFLICT (user_id) DO UPDATE SET trained_at = EXCLUDED.trained_at
        "#,
    )
    .bind(user_id)
    .bind(trained_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Backdate a claim so it looks abandoned
pub async fn set_running_since(pool: &PgPool, job_id: JobId, running_since: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE jobs SET running_since = $2 WHERE id = $1")
        .bind(job_id)
        .bind(running_since)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_next_run_at(pool: &PgPool, job_id: JobId, next_run_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE jobs SET next_run_at = $2 WHERE id = $1")
        .bind(job_id)
        .bind(next_run_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// Put a feed into redirect tracking as if it had been observed at `first_seen`
pub async fn set_redirect_tracking(
    pool: &PgPool,
    feed_id: FeedId,
    target: &str,
    first_seen: DateTime<Utc>,
) -> Result<()> {
    Feed::track_redirect(feed_id, target, first_seen, pool).await
}
