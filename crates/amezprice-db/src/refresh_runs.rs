//! Database operations for `refresh_runs`.
//!
//! Runs move `queued -> running -> succeeded | failed`; each transition is
//! guarded by the expected current status. A partial unique index allows at
//! most one queued or running run.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `refresh_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RefreshRunRow {
    pub id: i64,
    pub public_id: Uuid,
    /// `scheduler`, `cli`, or `admin`.
    pub trigger_source: String,
    pub status: String,
    pub products_checked: i32,
    pub products_failed: i32,
    pub price_changes: i32,
    pub alerts_sent: i32,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Final tallies written when a run succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshCounters {
    pub products_checked: i32,
    pub products_failed: i32,
    pub price_changes: i32,
    pub alerts_sent: i32,
}

const ONE_ACTIVE_INDEX: &str = "refresh_runs_one_active_idx";

/// Creates a run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::RefreshRunInProgress`] if another run is queued or
/// running, or [`DbError::Sqlx`] if the insert fails.
pub async fn create_refresh_run(
    pool: &PgPool,
    trigger_source: &str,
) -> Result<RefreshRunRow, DbError> {
    sqlx::query_as::<_, RefreshRunRow>(
        "INSERT INTO refresh_runs (public_id, trigger_source, status) \
         VALUES ($1, $2, 'queued') \
         RETURNING id, public_id, trigger_source, status, products_checked, products_failed, \
                   price_changes, alerts_sent, error_message, started_at, completed_at, \
                   created_at",
    )
    .bind(Uuid::new_v4())
    .bind(trigger_source)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.constraint() == Some(ONE_ACTIVE_INDEX) => {
            DbError::RefreshRunInProgress
        }
        _ => DbError::Sqlx(e),
    })
}

/// Fails every queued or running run. Called at server startup, when no run
/// of this process can still be in flight.
///
/// Returns the number of runs marked failed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn fail_abandoned_refresh_runs(pool: &PgPool) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'failed', completed_at = NOW(), \
             error_message = 'abandoned: process stopped before the run finished' \
         WHERE status IN ('queued', 'running')",
    )
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Marks a queued run as `running`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRefreshRunTransition`] if the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_refresh_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRefreshRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a running run as `succeeded` with its counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidRefreshRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_refresh_run(
    pool: &PgPool,
    id: i64,
    counters: RefreshCounters,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             products_checked = $2, products_failed = $3, \
             price_changes = $4, alerts_sent = $5 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(counters.products_checked)
    .bind(counters.products_failed)
    .bind(counters.price_changes)
    .bind(counters.alerts_sent)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRefreshRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a running run as `failed`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRefreshRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_refresh_run(pool: &PgPool, id: i64, error_message: &str) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE refresh_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRefreshRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no such run exists, or [`DbError::Sqlx`]
/// if the query fails.
pub async fn get_refresh_run(pool: &PgPool, id: i64) -> Result<RefreshRunRow, DbError> {
    sqlx::query_as::<_, RefreshRunRow>(
        "SELECT id, public_id, trigger_source, status, products_checked, products_failed, \
                price_changes, alerts_sent, error_message, started_at, completed_at, created_at \
         FROM refresh_runs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_refresh_runs(pool: &PgPool, limit: i64) -> Result<Vec<RefreshRunRow>, DbError> {
    let rows = sqlx::query_as::<_, RefreshRunRow>(
        "SELECT id, public_id, trigger_source, status, products_checked, products_failed, \
                price_changes, alerts_sent, error_message, started_at, completed_at, created_at \
         FROM refresh_runs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
