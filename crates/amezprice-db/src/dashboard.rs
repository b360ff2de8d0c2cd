//! Read-model query behind the admin dashboard.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// Headline counters for the admin dashboard.
#[derive(Debug, Clone, Default, sqlx::FromRow)]
pub struct DashboardStats {
    pub total_users: i64,
    pub active_users: i64,
    pub admin_users: i64,
    pub new_users_7d: i64,
    pub total_products: i64,
    pub amazon_products: i64,
    pub flipkart_products: i64,
    pub out_of_stock_products: i64,
    /// Distinct products with at least one tracker.
    pub tracked_products: i64,
    pub tracking_rows: i64,
    pub push_subscriptions: i64,
    pub price_points_today: i64,
    pub promotions_sent: i64,
    pub last_refresh_status: Option<String>,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

/// Computes all dashboard counters in one round-trip.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn dashboard_stats(pool: &PgPool) -> Result<DashboardStats, DbError> {
    let stats = sqlx::query_as::<_, DashboardStats>(
        "SELECT \
             (SELECT COUNT(*) FROM users) AS total_users, \
             (SELECT COUNT(*) FROM users WHERE is_active) AS active_users, \
             (SELECT COUNT(*) FROM users WHERE role = 'admin') AS admin_users, \
             (SELECT COUNT(*) FROM users WHERE created_at >= NOW() - INTERVAL '7 days') \
                 AS new_users_7d, \
             (SELECT COUNT(*) FROM products) AS total_products, \
             (SELECT COUNT(*) FROM products WHERE marketplace = 'amazon') AS amazon_products, \
             (SELECT COUNT(*) FROM products WHERE marketplace = 'flipkart') \
                 AS flipkart_products, \
             (SELECT COUNT(*) FROM products WHERE stock_status = 'out_of_stock') \
                 AS out_of_stock_products, \
             (SELECT COUNT(DISTINCT product_id) FROM user_products) AS tracked_products, \
             (SELECT COUNT(*) FROM user_products) AS tracking_rows, \
             (SELECT COUNT(*) FROM push_subscriptions) AS push_subscriptions, \
             (SELECT COUNT(*) FROM price_history \
                  WHERE recorded_on = (NOW() AT TIME ZONE 'UTC')::date) AS price_points_today, \
             (SELECT COUNT(*) FROM promotions WHERE status = 'completed') AS promotions_sent, \
             (SELECT status FROM refresh_runs ORDER BY created_at DESC, id DESC LIMIT 1) \
                 AS last_refresh_status, \
             (SELECT COALESCE(completed_at, started_at, created_at) FROM refresh_runs \
                  ORDER BY created_at DESC, id DESC LIMIT 1) AS last_refresh_at",
    )
    .fetch_one(pool)
    .await?;

    Ok(stats)
}
