use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};

use crate::common::{FeedId, SubscriptionId, UserId};

/// Subscription - links a user to a feed (soft-deleted via `unsubscribed_at`)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub feed_id: FeedId,
    /// Feeds merged into this one by redirect migration, oldest first
    pub previous_feed_ids: Vec<FeedId>,
    pub subscribed_at: DateTime<Utc>,
    pub unsubscribed_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.unsubscribed_at.is_none()
    }

    /// Subscribe, reactivating a soft-deleted subscription.
    pub async fn subscribe(user_id: UserId, feed_id: FeedId, pool: &PgPool) -> Result<Self> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (id, user_id, feed_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, feed_id) DO UPDATE SET unsubscribed_at = NULL
            RETURNING *
            "#,
        )
        .bind(SubscriptionId::new())
        .bind(user_id)
        .bind(feed_id)
        .fetch_one(pool)
        .await?;
        Ok(subscription)
    }

    pub async fn unsubscribe(user_id: UserId, feed_id: FeedId, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions SET unsubscribed_at = NOW()
            WHERE user_id = $1 AND feed_id = $2 AND unsubscribed_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find(user_id: UserId, feed_id: FeedId, pool: &PgPool) -> Result<Option<Self>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = $1 AND feed_id = $2",
        )
        .bind(user_id)
        .bind(feed_id)
        .fetch_optional(pool)
        .await?;
        Ok(subscription)
    }

    /// Active subscriptions on a feed, locked for the migration transaction.
    pub async fn lock_active_for_feed(feed_id: FeedId, conn: &mut PgConnection) -> Result<Vec<Self>> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT * FROM subscriptions
            WHERE feed_id = $1 AND unsubscribed_at IS NULL
            ORDER BY subscribed_at
            FOR UPDATE
            "#,
        )
        .bind(feed_id)
        .fetch_all(conn)
        .await?;
        Ok(subscriptions)
    }

    /// Move this subscription's user onto `target`, carrying history.
    ///
    /// Reactivates an existing (possibly soft-deleted) target subscription and
    /// appends history ids it does not already hold.
    pub async fn migrate_to(
        &self,
        target: FeedId,
        conn: &mut PgConnection,
    ) -> Result<Subscription> {
        let mut history = self.previous_feed_ids.clone();
        history.push(self.feed_id);
        history.retain(|id| *id != target);

        let migrated = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (id, user_id, feed_id, previous_feed_ids, subscribed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, feed_id) DO UPDATE
            SET unsubscribed_at = NULL,
                previous_feed_ids = subscriptions.previous_feed_ids || ARRAY(
                    SELECT h FROM UNNEST(EXCLUDED.previous_feed_ids) AS h
                    WHERE h <> ALL(subscriptions.previous_feed_ids)
                )
            RETURNING *
            "#,
        )
        .bind(SubscriptionId::new())
        .bind(self.user_id)
        .bind(target)
        .bind(&history)
        .bind(self.subscribed_at)
        .fetch_one(conn)
        .await?;
        Ok(migrated)
    }

    /// Soft-unsubscribe every active subscription on a feed.
    pub async fn unsubscribe_all_for_feed(feed_id: FeedId, conn: &mut PgConnection) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET unsubscribed_at = NOW()
            WHERE feed_id = $1 AND unsubscribed_at IS NULL
            "#,
        )
        .bind(feed_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected())
    }
}
