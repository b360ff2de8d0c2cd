//! Database operations for `user_products`: which users track which products,
//! and how they want to be alerted.

use amezprice_core::AlertPreference;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `user_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackingRow {
    pub user_id: i64,
    pub product_id: i64,
    pub email_alert: bool,
    pub push_alert: bool,
    pub price_threshold: Option<Decimal>,
    pub last_alerted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tracked product as listed on the user's own page.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TrackedProductRow {
    pub product_id: i64,
    pub marketplace: String,
    pub source_product_id: String,
    pub name: String,
    pub affiliate_url: String,
    pub image_url: Option<String>,
    pub current_price: Option<Decimal>,
    pub highest_price: Option<Decimal>,
    pub lowest_price: Option<Decimal>,
    pub stock_status: String,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub email_alert: bool,
    pub push_alert: bool,
    pub price_threshold: Option<Decimal>,
    pub tracked_since: DateTime<Utc>,
}

/// A user who tracks a given product, with what alerting needs to reach them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductTrackerRow {
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub email: String,
    pub email_alert: bool,
    pub push_alert: bool,
    pub price_threshold: Option<Decimal>,
}

impl ProductTrackerRow {
    #[must_use]
    pub fn preference(&self) -> AlertPreference {
        AlertPreference {
            email: self.email_alert,
            push: self.push_alert,
            threshold: self.price_threshold,
        }
    }
}

/// Partial update of alert settings. `None` leaves a field as is;
/// `price_threshold: Some(None)` clears the threshold.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackingUpdate {
    pub email_alert: Option<bool>,
    pub push_alert: Option<bool>,
    pub price_threshold: Option<Option<Decimal>>,
}

/// Starts tracking a product. Tracking an already-tracked product keeps the
/// existing alert settings.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn track_product(
    pool: &PgPool,
    user_id: i64,
    product_id: i64,
    email_alert: bool,
    push_alert: bool,
) -> Result<TrackingRow, DbError> {
    let row = sqlx::query_as::<_, TrackingRow>(
        "INSERT INTO user_products (user_id, product_id, email_alert, push_alert) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (user_id, product_id) DO UPDATE SET updated_at = NOW() \
         RETURNING user_id, product_id, email_alert, push_alert, price_threshold, \
                   last_alerted_at, created_at, updated_at",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(email_alert)
    .bind(push_alert)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Stops tracking. Returns whether a row was removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn untrack_product(pool: &PgPool, user_id: i64, product_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM user_products WHERE user_id = $1 AND product_id = $2")
        .bind(user_id)
        .bind(product_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Applies a partial alert-settings update.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the user does not track the product, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_tracking(
    pool: &PgPool,
    user_id: i64,
    product_id: i64,
    update: TrackingUpdate,
) -> Result<TrackingRow, DbError> {
    let (set_threshold, threshold) = match update.price_threshold {
        Some(value) => (true, value),
        None => (false, None),
    };

    sqlx::query_as::<_, TrackingRow>(
        "UPDATE user_products \
         SET email_alert     = COALESCE($3, email_alert), \
             push_alert      = COALESCE($4, push_alert), \
             price_threshold = CASE WHEN $5 THEN $6 ELSE price_threshold END, \
             updated_at      = NOW() \
         WHERE user_id = $1 AND product_id = $2 \
         RETURNING user_id, product_id, email_alert, push_alert, price_threshold, \
                   last_alerted_at, created_at, updated_at",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(update.email_alert)
    .bind(update.push_alert)
    .bind(set_threshold)
    .bind(threshold)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Stamps `last_alerted_at = NOW()` for one tracking row.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_tracking_alerted(
    pool: &PgPool,
    user_id: i64,
    product_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE user_products SET last_alerted_at = NOW() \
         WHERE user_id = $1 AND product_id = $2",
    )
    .bind(user_id)
    .bind(product_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// A user's tracked products, most recently tracked first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_tracked_products(
    pool: &PgPool,
    user_id: i64,
) -> Result<Vec<TrackedProductRow>, DbError> {
    let rows = sqlx::query_as::<_, TrackedProductRow>(
        "SELECT p.id AS product_id, p.marketplace, p.source_product_id, p.name, \
                p.affiliate_url, p.image_url, p.current_price, p.highest_price, \
                p.lowest_price, p.stock_status, p.last_checked_at, \
                up.email_alert, up.push_alert, up.price_threshold, \
                up.created_at AS tracked_since \
         FROM user_products up \
         JOIN products p ON p.id = up.product_id \
         WHERE up.user_id = $1 \
         ORDER BY up.created_at DESC, p.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Active users tracking a product.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_product_trackers(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<ProductTrackerRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductTrackerRow>(
        "SELECT u.id AS user_id, u.username, u.first_name, u.email, \
                up.email_alert, up.push_alert, up.price_threshold \
         FROM user_products up \
         JOIN users u ON u.id = up.user_id \
         WHERE up.product_id = $1 AND u.is_active = TRUE \
         ORDER BY u.id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
