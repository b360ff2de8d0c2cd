//! Database operations for `price_history`: one point per product per UTC day.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `price_history` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PricePointRow {
    pub id: i64,
    pub product_id: i64,
    pub recorded_on: NaiveDate,
    /// Latest price observed that day.
    pub price: Decimal,
    pub day_high: Decimal,
    pub day_low: Decimal,
    pub in_stock: bool,
    pub recorded_at: DateTime<Utc>,
}

/// Records today's (UTC) price for a product.
///
/// The first observation of the day inserts a row; later ones overwrite
/// `price`/`in_stock` and widen `day_high`/`day_low`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn record_price_point(
    pool: &PgPool,
    product_id: i64,
    price: Decimal,
    in_stock: bool,
) -> Result<PricePointRow, DbError> {
    let row = sqlx::query_as::<_, PricePointRow>(
        "INSERT INTO price_history \
             (product_id, recorded_on, price, day_high, day_low, in_stock) \
         VALUES ($1, (NOW() AT TIME ZONE 'UTC')::date, $2, $2, $2, $3) \
         ON CONFLICT (product_id, recorded_on) DO UPDATE SET \
             price       = EXCLUDED.price, \
             day_high    = GREATEST(price_history.day_high, EXCLUDED.price), \
             day_low     = LEAST(price_history.day_low, EXCLUDED.price), \
             in_stock    = EXCLUDED.in_stock, \
             recorded_at = NOW() \
         RETURNING id, product_id, recorded_on, price, day_high, day_low, in_stock, recorded_at",
    )
    .bind(product_id)
    .bind(price)
    .bind(in_stock)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Returns the most recent `limit` daily points, oldest first, optionally
/// bounded below by `since`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_price_history(
    pool: &PgPool,
    product_id: i64,
    since: Option<NaiveDate>,
    limit: i64,
) -> Result<Vec<PricePointRow>, DbError> {
    let rows = sqlx::query_as::<_, PricePointRow>(
        "SELECT id, product_id, recorded_on, price, day_high, day_low, in_stock, recorded_at \
         FROM ( \
             SELECT id, product_id, recorded_on, price, day_high, day_low, in_stock, recorded_at \
             FROM price_history \
             WHERE product_id = $1 \
               AND ($2::date IS NULL OR recorded_on >= $2) \
             ORDER BY recorded_on DESC \
             LIMIT $3 \
         ) recent \
         ORDER BY recorded_on ASC",
    )
    .bind(product_id)
    .bind(since)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
