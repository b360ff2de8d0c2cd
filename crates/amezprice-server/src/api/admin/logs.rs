use amezprice_db::{ActivityLogFilters, ActivityLogRow, LogLevel};
use amezprice_tracker::record_activity;
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::middleware::{CurrentSession, RequestId};

use super::super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(in crate::api) struct LogItem {
    id: i64,
    level: String,
    category: String,
    message: String,
    user_id: Option<i64>,
    context: Value,
    created_at: DateTime<Utc>,
}

impl From<ActivityLogRow> for LogItem {
    fn from(row: ActivityLogRow) -> Self {
        Self {
            id: row.id,
            level: row.level,
            category: row.category,
            message: row.message,
            user_id: row.user_id,
            context: row.context,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct LogPage {
    items: Vec<LogItem>,
    /// Pass as `before_id` to fetch the next (older) page.
    next_before_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct LogQuery {
    level: Option<String>,
    category: Option<String>,
    before_id: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct PurgeQuery {
    /// Keep entries newer than this many days; omit to clear everything.
    older_than_days: Option<i64>,
}

pub(in crate::api) async fn list_logs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<LogQuery>,
) -> Result<Json<ApiResponse<LogPage>>, ApiError> {
    let level = match query.level.as_deref() {
        Some(raw) => Some(LogLevel::parse(raw).ok_or_else(|| {
            ApiError::new(
                req_id.0.clone(),
                "validation_error",
                format!("level: unknown level '{raw}'"),
            )
        })?),
        None => None,
    };
    let limit = normalize_limit(query.limit);
    let filters = ActivityLogFilters {
        level,
        category: query.category.as_deref().filter(|c| !c.is_empty()),
        before_id: query.before_id,
        limit,
    };

    let rows = amezprice_db::list_activity_logs(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let full_page = i64::try_from(rows.len()).unwrap_or(i64::MAX) == limit;
    let next_before_id = rows.last().map(|r| r.id).filter(|_| full_page);

    Ok(ApiResponse::new(
        LogPage {
            items: rows.into_iter().map(LogItem::from).collect(),
            next_before_id,
        },
        req_id.0,
    ))
}

pub(in crate::api) async fn purge_logs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Query(query): Query<PurgeQuery>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let older_than = match query.older_than_days {
        Some(days) if days < 0 => {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                "older_than_days: must not be negative",
            ));
        }
        Some(days) => Some(Utc::now() - Duration::days(days.min(3650))),
        None => None,
    };

    let deleted = amezprice_db::purge_activity_logs(&state.pool, older_than)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(admin_id = session.user_id, deleted, "activity logs purged");
    record_activity(
        &state.pool,
        LogLevel::Warning,
        "admin",
        &format!("{} purged {deleted} log entries", session.username),
        Some(session.user_id),
        json!({ "older_than_days": query.older_than_days }),
    )
    .await;

    Ok(ApiResponse::new(json!({ "deleted": deleted }), req_id.0))
}
