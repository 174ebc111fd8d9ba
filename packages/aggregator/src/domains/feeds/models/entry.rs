use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{EntryId, FeedId, UserId};

/// Entry - one item of a feed, identified within the feed by its GUID
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Entry {
    pub id: EntryId,
    pub feed_id: FeedId,
    pub guid: String,
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub async fn create(
        feed_id: FeedId,
        guid: &str,
        title: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let entry = sqlx::query_as::<_, Entry>(
            r#"
            INSERT INTO entries (id, feed_id, guid, title)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (feed_id, guid) DO UPDATE SET title = COALESCE(EXCLUDED.title, entries.title)
            RETURNING *
            "#,
        )
        .bind(EntryId::new())
        .bind(feed_id)
        .bind(guid)
        .bind(title)
        .fetch_one(pool)
        .await?;
        Ok(entry)
    }

    pub async fn star(user_id: UserId, entry_id: EntryId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_entries (user_id, entry_id, starred_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, entry_id) DO UPDATE SET starred_at = COALESCE(user_entries.starred_at, NOW())
            "#,
        )
        .bind(user_id)
        .bind(entry_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_starred(user_id: UserId, pool: &PgPool) -> Result<Vec<Self>> {
        let entries = sqlx::query_as::<_, Entry>(
            r#"
            SELECT e.* FROM entries e
            JOIN user_entries ue ON ue.entry_id = e.id
            WHERE ue.user_id = $1 AND ue.starred_at IS NOT NULL
            ORDER BY e.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(entries)
    }

    /// Copy stars on `from` entries to the `to` entry with the same GUID.
    ///
    /// GUID reuse across feeds is a heuristic match. Returns
    /// `(carried, orphaned)`, where orphaned stars had no GUID match.
    pub async fn carry_stars(
        from: FeedId,
        to: FeedId,
        user_ids: &[UserId],
        conn: &mut PgConnection,
    ) -> Result<(u64, i64)> {
        let carried = sqlx::query(
            r#"
            INSERT INTO user_entries (user_id, entry_id, starred_at)
            SELECT ue.user_id, target.id, ue.starred_at
            FROM user_entries ue
            JOIN entries source ON source.id = ue.entry_id AND source.feed_id = $1
            JOIN entries target ON target.feed_id = $2 AND target.guid = source.guid
            WHERE ue.starred_at IS NOT NULL AND ue.user_id = ANY($3)
            ON CONFLICT (user_id, entry_id) DO UPDATE
            SET starred_at = COALESCE(user_entries.starred_at, EXCLUDED.starred_at)
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(user_ids)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let (orphaned,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM user_entries ue
            JOIN entries source ON source.id = ue.entry_id AND source.feed_id = $1
            WHERE ue.starred_at IS NOT NULL AND ue.user_id = ANY($3)
              AND NOT EXISTS (
                  SELECT 1 FROM entries target
                  WHERE target.feed_id = $2 AND target.guid = source.guid
              )
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(user_ids)
        .fetch_one(&mut *conn)
        .await?;

        Ok((carried, orphaned))
    }
}
