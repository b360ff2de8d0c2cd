use std::sync::Arc;

use amezprice_db::{LogLevel, RefreshRunRow};
use amezprice_tracker::{execute_refresh_run, record_activity, RefreshTrigger};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::middleware::{CurrentSession, RequestId};

use super::super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(in crate::api) struct RefreshRunItem {
    id: i64,
    run_id: Uuid,
    trigger_source: String,
    status: String,
    products_checked: i32,
    products_failed: i32,
    price_changes: i32,
    alerts_sent: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<RefreshRunRow> for RefreshRunItem {
    fn from(row: RefreshRunRow) -> Self {
        Self {
            id: row.id,
            run_id: row.public_id,
            trigger_source: row.trigger_source,
            status: row.status,
            products_checked: row.products_checked,
            products_failed: row.products_failed,
            price_changes: row.price_changes,
            alerts_sent: row.alerts_sent,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct RunQuery {
    limit: Option<i64>,
}

pub(in crate::api) async fn list_refresh_runs(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<RunQuery>,
) -> Result<Json<ApiResponse<Vec<RefreshRunItem>>>, ApiError> {
    let rows = amezprice_db::list_refresh_runs(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        rows.into_iter().map(RefreshRunItem::from).collect(),
        req_id.0,
    ))
}

/// Queues a manual refresh and runs it in the background. Refused with 409
/// while another run is queued or running.
pub(in crate::api) async fn trigger_refresh(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
) -> Result<(StatusCode, Json<ApiResponse<RefreshRunItem>>), ApiError> {
    let run = amezprice_db::create_refresh_run(&state.pool, RefreshTrigger::Admin.as_str())
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(run_id = run.id, admin_id = session.user_id, "manual refresh queued");
    record_activity(
        &state.pool,
        LogLevel::Info,
        "admin",
        &format!("{} started refresh run {}", session.username, run.id),
        Some(session.user_id),
        json!({ "run_id": run.id }),
    )
    .await;

    let tracker = Arc::clone(&state.tracker);
    let run_id = run.id;
    tokio::spawn(async move {
        if let Err(e) = execute_refresh_run(&tracker, run_id).await {
            tracing::error!(run_id, error = %e, "manual refresh failed");
        }
    });

    Ok((StatusCode::ACCEPTED, ApiResponse::new(run.into(), req_id.0)))
}
