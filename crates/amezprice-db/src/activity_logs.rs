//! Database operations for `activity_logs`, the store behind the admin log
//! viewer.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, accepting `warn` as an alias for `warning`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// A row from the `activity_logs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActivityLogRow {
    pub id: i64,
    pub level: String,
    pub category: String,
    pub message: String,
    pub user_id: Option<i64>,
    pub context: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivityLog<'a> {
    pub level: LogLevel,
    /// Short machine-friendly tag, e.g. `search`, `auth`, `notify`, `admin`.
    pub category: &'a str,
    pub message: &'a str,
    pub user_id: Option<i64>,
    pub context: Value,
}

/// Filters for the log viewer. Paging is keyset-based: pass the smallest `id`
/// of the previous page as `before_id`.
#[derive(Debug, Clone, Default)]
pub struct ActivityLogFilters<'a> {
    pub level: Option<LogLevel>,
    pub category: Option<&'a str>,
    pub before_id: Option<i64>,
    pub limit: i64,
}

/// Appends a log entry and returns its id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_activity_log(pool: &PgPool, entry: &NewActivityLog<'_>) -> Result<i64, DbError> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO activity_logs (level, category, message, user_id, context) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING id",
    )
    .bind(entry.level.as_str())
    .bind(entry.category)
    .bind(entry.message)
    .bind(entry.user_id)
    .bind(&entry.context)
    .fetch_one(pool)
    .await?;

    Ok(id)
}

/// Newest-first page of log entries.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_activity_logs(
    pool: &PgPool,
    filters: &ActivityLogFilters<'_>,
) -> Result<Vec<ActivityLogRow>, DbError> {
    let rows = sqlx::query_as::<_, ActivityLogRow>(
        "SELECT id, level, category, message, user_id, context, created_at \
         FROM activity_logs \
         WHERE ($1::TEXT IS NULL OR level = $1) \
           AND ($2::TEXT IS NULL OR category = $2) \
           AND ($3::BIGINT IS NULL OR id < $3) \
         ORDER BY id DESC \
         LIMIT $4",
    )
    .bind(filters.level.map(LogLevel::as_str))
    .bind(filters.category)
    .bind(filters.before_id)
    .bind(filters.limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Deletes entries created before `older_than`, or all entries when `None`.
/// Returns the number removed.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the delete fails.
pub async fn purge_activity_logs(
    pool: &PgPool,
    older_than: Option<DateTime<Utc>>,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "DELETE FROM activity_logs WHERE ($1::timestamptz IS NULL OR created_at < $1)",
    )
    .bind(older_than)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_parse_accepts_warn_alias() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::parse("error"), Some(LogLevel::Error));
        assert_eq!(LogLevel::parse("debug"), None);
    }
}
