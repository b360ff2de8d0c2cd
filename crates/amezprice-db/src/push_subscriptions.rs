//! Database operations for `push_subscriptions`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `push_subscriptions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PushSubscriptionRow {
    pub id: i64,
    pub user_id: i64,
    pub endpoint: String,
    /// Browser's P-256 public key, base64url.
    pub p256dh: String,
    /// 16-byte auth secret, base64url.
    pub auth_secret: String,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewPushSubscription<'a> {
    pub user_id: i64,
    pub endpoint: &'a str,
    pub p256dh: &'a str,
    pub auth_secret: &'a str,
    pub user_agent: Option<&'a str>,
}

/// Registers a subscription. An endpoint seen before is re-bound to the
/// current user with the new keys.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_push_subscription(
    pool: &PgPool,
    sub: &NewPushSubscription<'_>,
) -> Result<PushSubscriptionRow, DbError> {
    let row = sqlx::query_as::<_, PushSubscriptionRow>(
        "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth_secret, user_agent) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (endpoint) DO UPDATE SET \
             user_id     = EXCLUDED.user_id, \
             p256dh      = EXCLUDED.p256dh, \
             auth_secret = EXCLUDED.auth_secret, \
             user_agent  = EXCLUDED.user_agent \
         RETURNING id, user_id, endpoint, p256dh, auth_secret, user_agent, \
                   created_at, last_used_at",
    )
    .bind(sub.user_id)
    .bind(sub.endpoint)
    .bind(sub.p256dh)
    .bind(sub.auth_secret)
    .bind(sub.user_agent)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Deletes a subscription by id. Returns whether a row was removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_push_subscription(pool: &PgPool, id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Deletes a user's subscription by endpoint. Returns whether a row was removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn delete_push_subscription_by_endpoint(
    pool: &PgPool,
    user_id: i64,
    endpoint: &str,
) -> Result<bool, DbError> {
    let result =
        sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
            .bind(user_id)
            .bind(endpoint)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

/// Stamps `last_used_at = NOW()` after a successful delivery.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn touch_push_subscription(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE push_subscriptions SET last_used_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_push_subscriptions_for_user(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<PushSubscriptionRow>, DbError> {
    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT id, user_id, endpoint, p256dh, auth_secret, user_agent, created_at, last_used_at \
         FROM push_subscriptions \
         WHERE user_id = $1 \
         ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Subscriptions for a batch of users, ordered by user.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_push_subscriptions_for_users(
    pool: &PgPool,
    user_ids: &[i64],
) -> Result<Vec<PushSubscriptionRow>, DbError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }

    let rows = sqlx::query_as::<_, PushSubscriptionRow>(
        "SELECT id, user_id, endpoint, p256dh, auth_secret, user_agent, created_at, last_used_at \
         FROM push_subscriptions \
         WHERE user_id = ANY($1) \
         ORDER BY user_id, id",
    )
    .bind(user_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
