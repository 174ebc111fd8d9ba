use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool};

use crate::common::FeedId;
use crate::domains::feeds::CacheHeaders;

/// Feed - a remote RSS/Atom document polled on a schedule
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Feed {
    pub id: FeedId,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,

    // Cache validators
    pub etag: Option<String>,
    pub last_modified_header: Option<String>,
    pub body_hash: Option<String>,
    pub ttl_minutes: Option<i32>,

    // Fetch health
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub last_entries_updated_at: Option<DateTime<Utc>>,
    pub next_fetch_at: Option<DateTime<Utc>>,

    // Redirect tracking
    pub redirect_url: Option<String>,
    pub redirect_first_seen_at: Option<DateTime<Utc>>,

    // WebSub
    pub websub_hub_url: Option<String>,
    pub websub_self_url: Option<String>,
    pub websub_active: bool,
    pub websub_lease_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata written after a changed body was parsed and diffed.
#[derive(Debug, Clone, Default)]
pub struct FeedContentUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
    pub websub_hub_url: Option<String>,
    pub websub_self_url: Option<String>,
    pub body_hash: String,
    pub ttl_minutes: Option<i32>,
    /// Set when the entry processor reported changes.
    pub entries_updated_at: Option<DateTime<Utc>>,
}

impl Feed {
    /// The redirect currently being tracked, if any.
    pub fn tracked_redirect(&self) -> Option<(&str, DateTime<Utc>)> {
        match (&self.redirect_url, self.redirect_first_seen_at) {
            (Some(url), Some(first_seen)) => Some((url.as_str(), first_seen)),
            _ => None,
        }
    }

    pub async fn find_by_id(id: FeedId, pool: &PgPool) -> Result<Option<Self>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(feed)
    }

    pub async fn find_by_url<'e>(url: &str, db: impl PgExecutor<'e>) -> Result<Option<Self>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = $1")
            .bind(url)
            .fetch_optional(db)
            .await?;
        Ok(feed)
    }

    /// Find or create the feed for a URL.
    pub async fn find_or_create(url: &str, pool: &PgPool) -> Result<Self> {
        let feed = sqlx::query_as::<_, Feed>(
            r#"
            INSERT INTO feeds (id, url)
            VALUES ($1, $2)
            ON CONFLICT (url) DO UPDATE SET updated_at = feeds.updated_at
            RETURNING *
            "#,
        )
        .bind(FeedId::new())
        .bind(url)
        .fetch_one(pool)
        .await?;
        Ok(feed)
    }

    /// Body unchanged (same hash or 304): refresh validators and the schedule.
    pub async fn record_unchanged(
        id: FeedId,
        cache: &CacheHeaders,
        fetched_at: DateTime<Utc>,
        next_fetch_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET etag = COALESCE($2, etag),
                last_modified_header = COALESCE($3, last_modified_header),
                consecutive_failures = 0,
                last_error = NULL,
                last_fetched_at = $4,
                next_fetch_at = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&cache.etag)
        .bind(&cache.last_modified)
        .bind(fetched_at)
        .bind(next_fetch_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Body changed and was processed.
    pub async fn record_changed(
        id: FeedId,
        update: &FeedContentUpdate,
        cache: &CacheHeaders,
        fetched_at: DateTime<Utc>,
        next_fetch_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                site_url = COALESCE($4, site_url),
                websub_hub_url = $5,
                websub_self_url = $6,
                body_hash = $7,
                ttl_minutes = $8,
                last_entries_updated_at = COALESCE($9, last_entries_updated_at),
                etag = $10,
                last_modified_header = $11,
                consecutive_failures = 0,
                last_error = NULL,
                last_fetched_at = $12,
                next_fetch_at = $13,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(&update.site_url)
        .bind(&update.websub_hub_url)
        .bind(&update.websub_self_url)
        .bind(&update.body_hash)
        .bind(update.ttl_minutes)
        .bind(update.entries_updated_at)
        .bind(&cache.etag)
        .bind(&cache.last_modified)
        .bind(fetched_at)
        .bind(next_fetch_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Count one more failure. The increment happens in SQL.
    pub async fn record_failure(
        id: FeedId,
        error: &str,
        fetched_at: DateTime<Utc>,
        next_fetch_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<i32> {
        let (failures,): (i32,) = sqlx::query_as(
            r#"
            UPDATE feeds
            SET consecutive_failures = consecutive_failures + 1,
                last_error = $2,
                last_fetched_at = $3,
                next_fetch_at = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING consecutive_failures
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(fetched_at)
        .bind(next_fetch_at)
        .fetch_one(pool)
        .await?;
        Ok(failures)
    }

    pub async fn set_next_fetch_at(
        id: FeedId,
        next_fetch_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query("UPDATE feeds SET next_fetch_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(next_fetch_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Start (or restart) tracking a redirect target.
    pub async fn track_redirect(
        id: FeedId,
        target: &str,
        first_seen_at: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET redirect_url = $2, redirect_first_seen_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(target)
        .bind(first_seen_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn clear_redirect_tracking<'e>(id: FeedId, db: impl PgExecutor<'e>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET redirect_url = NULL, redirect_first_seen_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(())
    }

    /// Point the feed at a new URL, clear tracking and reset fetch health.
    ///
    /// Failures recorded against the old URL do not carry over. Fails with a
    /// unique violation if another feed already owns the URL.
    pub async fn rewrite_url<'e>(id: FeedId, url: &str, db: impl PgExecutor<'e>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET url = $2,
                redirect_url = NULL,
                redirect_first_seen_at = NULL,
                consecutive_failures = 0,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(db)
        .await?;
        Ok(())
    }
}
