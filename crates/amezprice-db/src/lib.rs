use amezprice_core::AppConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

// Path relative to crates/amezprice-db/Cargo.toml; resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_connections: config.db_max_connections,
            min_connections: config.db_min_connections,
            acquire_timeout_secs: config.db_acquire_timeout_secs,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,
    #[error("refresh run {id} is not in expected status '{expected_status}'")]
    InvalidRefreshRunTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("the last active admin cannot be demoted, deactivated or deleted")]
    LastActiveAdmin,
    #[error("a refresh run is already queued or running")]
    RefreshRunInProgress,
    #[error("promotion {id} is not in expected status '{expected_status}'")]
    InvalidPromotionTransition {
        id: i64,
        expected_status: &'static str,
    },
    #[error("stored value is invalid: {0}")]
    InvalidValue(#[from] amezprice_core::CoreError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    /// Whether the error is a Postgres unique-constraint violation (`23505`).
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Sqlx(sqlx::Error::Database(db_err)) => {
                db_err.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

/// Connect to a Postgres pool using explicit URL and config.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the connection cannot be established.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Run all pending migrations against the pool.
///
/// Returns the number of migrations that were applied.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if any migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    // The _sqlx_migrations table may not exist yet on a fresh database;
    // treat absence as zero applied.
    let applied_before: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    MIGRATOR.run(pool).await?;

    let applied_after: i64 =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    let delta = (applied_after - applied_before).max(0);
    Ok(usize::try_from(delta).unwrap_or(0))
}

/// Send a `SELECT 1` to verify the pool has a live connection.
///
/// # Errors
///
/// Returns [`sqlx::Error`] if the query fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

/// Ping the pool and return a typed error on failure.
///
/// # Errors
///
/// Returns [`DbError`] if the ping fails.
pub async fn health_check(pool: &PgPool) -> Result<(), DbError> {
    ping(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_config_has_sane_defaults() {
        let config = PoolConfig::default();

        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, DEFAULT_ACQUIRE_TIMEOUT_SECS);
    }

    #[test]
    fn not_found_is_not_a_unique_violation() {
        assert!(!DbError::NotFound.is_unique_violation());
    }
}

pub mod activity_logs;
pub mod dashboard;
pub mod price_history;
pub mod products;
pub mod promotions;
pub mod push_subscriptions;
pub mod refresh_runs;
pub mod sessions;
pub mod tracking;
pub mod users;

pub use activity_logs::{
    insert_activity_log, list_activity_logs, purge_activity_logs, ActivityLogFilters,
    ActivityLogRow, LogLevel, NewActivityLog,
};
pub use dashboard::{dashboard_stats, DashboardStats};
pub use price_history::{list_price_history, record_price_point, PricePointRow};
pub use products::{
    get_product, get_product_by_source, list_products, list_products_for_refresh,
    mark_product_checked, upsert_product, ProductListFilters, ProductRow, UpsertProduct,
};
pub use promotions::{
    complete_promotion, create_promotion, fail_promotion, get_promotion, list_promotion_audience,
    list_promotion_recipients, list_promotions, record_promotion_recipient, start_promotion,
    AudienceMember, NewPromotion, PromotionCounters, PromotionRecipientRow, PromotionRow,
};
pub use push_subscriptions::{
    delete_push_subscription, delete_push_subscription_by_endpoint,
    list_push_subscriptions_for_user, list_push_subscriptions_for_users, touch_push_subscription,
    upsert_push_subscription, NewPushSubscription, PushSubscriptionRow,
};
pub use refresh_runs::{
    complete_refresh_run, create_refresh_run, fail_abandoned_refresh_runs, fail_refresh_run,
    get_refresh_run, list_refresh_runs, start_refresh_run, RefreshCounters, RefreshRunRow,
};
pub use sessions::{
    create_session, delete_session, delete_user_sessions, get_active_session,
    purge_expired_sessions, rotate_session_token, touch_session, NewSession, SessionWithUser,
};
pub use tracking::{
    list_product_trackers, list_tracked_products, mark_tracking_alerted, track_product,
    untrack_product, update_tracking, ProductTrackerRow, TrackedProductRow, TrackingRow,
    TrackingUpdate,
};
pub use users::{
    count_admins, count_users, create_user, delete_user, get_user_by_id, get_user_by_login,
    list_users, touch_last_login, update_user_admin_fields, NewUser, UserAdminUpdate,
    UserListFilters, UserRow,
};
