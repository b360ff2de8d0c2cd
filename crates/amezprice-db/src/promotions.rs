//! Database operations for `promotions` and `promotion_recipients`.
//!
//! Promotions move `queued -> sending -> completed | failed`.

use amezprice_core::{PromotionAudience, PromotionChannel};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `promotions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PromotionRow {
    pub id: i64,
    pub public_id: Uuid,
    pub subject: String,
    pub body: String,
    pub link_url: Option<String>,
    pub channel: String,
    pub audience: String,
    pub selected_user_ids: Vec<i64>,
    pub status: String,
    pub created_by: Option<i64>,
    pub recipients_total: i32,
    pub emails_sent: i32,
    pub pushes_sent: i32,
    pub failures: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PromotionRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the stored channel is unknown.
    pub fn channel(&self) -> Result<PromotionChannel, DbError> {
        Ok(self.channel.parse::<PromotionChannel>()?)
    }

    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the stored audience is unknown.
    pub fn audience(&self) -> Result<PromotionAudience, DbError> {
        Ok(self.audience.parse::<PromotionAudience>()?)
    }
}

/// A row from the `promotion_recipients` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PromotionRecipientRow {
    pub id: i64,
    pub promotion_id: i64,
    pub user_id: i64,
    pub channel: String,
    /// `sent`, `skipped`, or `failed`.
    pub status: String,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An active user a promotion will be delivered to.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AudienceMember {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct NewPromotion<'a> {
    pub subject: &'a str,
    pub body: &'a str,
    pub link_url: Option<&'a str>,
    pub channel: PromotionChannel,
    pub audience: PromotionAudience,
    /// Ignored unless `audience` is [`PromotionAudience::Selected`].
    pub selected_user_ids: &'a [i64],
    pub created_by: Option<i64>,
}

/// Final tallies written when a promotion completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromotionCounters {
    pub emails_sent: i32,
    pub pushes_sent: i32,
    pub failures: i32,
}

/// Creates a promotion in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_promotion(
    pool: &PgPool,
    promo: &NewPromotion<'_>,
) -> Result<PromotionRow, DbError> {
    let selected: &[i64] = match promo.audience {
        PromotionAudience::All => &[],
        PromotionAudience::Selected => promo.selected_user_ids,
    };

    let row = sqlx::query_as::<_, PromotionRow>(
        "INSERT INTO promotions \
             (public_id, subject, body, link_url, channel, audience, selected_user_ids, \
              status, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'queued', $8) \
         RETURNING id, public_id, subject, body, link_url, channel, audience, \
                   selected_user_ids, status, created_by, recipients_total, emails_sent, \
                   pushes_sent, failures, error_message, created_at, started_at, completed_at",
    )
    .bind(Uuid::new_v4())
    .bind(promo.subject)
    .bind(promo.body)
    .bind(promo.link_url)
    .bind(promo.channel.as_str())
    .bind(promo.audience.as_str())
    .bind(selected)
    .bind(promo.created_by)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a queued promotion as `sending` and records the audience size.
///
/// # Errors
///
/// Returns [`DbError::InvalidPromotionTransition`] if the promotion is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_promotion(pool: &PgPool, id: i64, recipients_total: i32) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE promotions \
         SET status = 'sending', started_at = NOW(), recipients_total = $2 \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .bind(recipients_total)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidPromotionTransition {
            id,
            expected_status: "queued",
        });
    }
    Ok(())
}

/// Marks a sending promotion as `completed` with its counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidPromotionTransition`] if the promotion is not
/// `sending`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_promotion(
    pool: &PgPool,
    id: i64,
    counters: PromotionCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE promotions \
         SET status = 'completed', completed_at = NOW(), \
             emails_sent = $2, pushes_sent = $3, failures = $4 \
         WHERE id = $1 AND status = 'sending'",
    )
    .bind(id)
    .bind(counters.emails_sent)
    .bind(counters.pushes_sent)
    .bind(counters.failures)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidPromotionTransition {
            id,
            expected_status: "sending",
        });
    }
    Ok(())
}

/// Marks a queued or sending promotion as `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidPromotionTransition`] if the promotion already
/// finished, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_promotion(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE promotions \
         SET status = 'failed', completed_at = NOW(), error_message = $2 \
         WHERE id = $1 AND status IN ('queued', 'sending')",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidPromotionTransition {
            id,
            expected_status: "queued or sending",
        });
    }
    Ok(())
}

/// Records one delivery outcome.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn record_promotion_recipient(
    pool: &PgPool,
    promotion_id: i64,
    user_id: i64,
    channel: &str,
    status: &str,
    error_message: Option<&str>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO promotion_recipients \
             (promotion_id, user_id, channel, status, error_message) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(promotion_id)
    .bind(user_id)
    .bind(channel)
    .bind(status)
    .bind(error_message)
    .execute(pool)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no such promotion exists, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_promotion(pool: &PgPool, id: i64) -> Result<PromotionRow, DbError> {
    sqlx::query_as::<_, PromotionRow>(
        "SELECT id, public_id, subject, body, link_url, channel, audience, \
                selected_user_ids, status, created_by, recipients_total, emails_sent, \
                pushes_sent, failures, error_message, created_at, started_at, completed_at \
         FROM promotions \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Newest-first page of promotions.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_promotions(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<PromotionRow>, DbError> {
    let rows = sqlx::query_as::<_, PromotionRow>(
        "SELECT id, public_id, subject, body, link_url, channel, audience, \
                selected_user_ids, status, created_by, recipients_total, emails_sent, \
                pushes_sent, failures, error_message, created_at, started_at, completed_at \
         FROM promotions \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Delivery outcomes for one promotion, in send order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_promotion_recipients(
    pool: &PgPool,
    promotion_id: i64,
    limit: i64,
) -> Result<Vec<PromotionRecipientRow>, DbError> {
    let rows = sqlx::query_as::<_, PromotionRecipientRow>(
        "SELECT id, promotion_id, user_id, channel, status, error_message, created_at \
         FROM promotion_recipients \
         WHERE promotion_id = $1 \
         ORDER BY id \
         LIMIT $2",
    )
    .bind(promotion_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Resolves a promotion's audience to active users. Unknown or inactive
/// selected ids are dropped silently.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_promotion_audience(
    pool: &PgPool,
    audience: PromotionAudience,
    selected_user_ids: &[i64],
) -> Result<Vec<AudienceMember>, DbError> {
    let rows = sqlx::query_as::<_, AudienceMember>(
        "SELECT id AS user_id, username, first_name, email \
         FROM users \
         WHERE is_active = TRUE \
           AND ($1 = 'all' OR id = ANY($2)) \
         ORDER BY id",
    )
    .bind(audience.as_str())
    .bind(selected_user_ids)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
