use amezprice_core::Role;
use amezprice_db::{LogLevel, UserAdminUpdate, UserListFilters, UserRow};
use amezprice_tracker::record_activity;
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::middleware::{CurrentSession, RequestId};

use super::super::{
    map_db_error, normalize_limit, normalize_offset, validation_error, ApiError, ApiResponse,
    AppState, Page,
};

#[derive(Debug, Serialize)]
pub(in crate::api) struct AdminUserItem {
    id: i64,
    user_id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: String,
    is_active: bool,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for AdminUserItem {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            user_id: row.public_id,
            username: row.username,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            role: row.role,
            is_active: row.is_active,
            last_login_at: row.last_login_at,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct UserQuery {
    search: Option<String>,
    role: Option<String>,
    is_active: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub(in crate::api) struct UserPatch {
    role: Option<Role>,
    is_active: Option<bool>,
}

/// Admins may not demote, deactivate, or delete themselves. The last-admin
/// rule is enforced by the database update itself.
///
/// `removes_admin` is true when the change would leave `target` unable to act
/// as an admin (demotion, deactivation, or deletion).
fn check_self_change(acting_user_id: i64, target: &UserRow, removes_admin: bool) -> bool {
    !(removes_admin && target.id == acting_user_id)
}

fn removes_admin(target: &UserRow, patch: &UserPatch) -> bool {
    let demoted = target.is_admin() && patch.role == Some(Role::User);
    let deactivated = target.is_active && patch.is_active == Some(false);
    demoted || deactivated
}

async fn load_target(state: &AppState, req_id: &str, id: i64) -> Result<UserRow, ApiError> {
    amezprice_db::get_user_by_id(&state.pool, id)
        .await
        .map_err(|e| match e {
            amezprice_db::DbError::NotFound => ApiError::new(req_id, "not_found", "user not found"),
            other => map_db_error(req_id.to_owned(), &other),
        })
}

fn enforce_self_rule(
    req_id: &str,
    session: &CurrentSession,
    target: &UserRow,
    removes_admin: bool,
) -> Result<(), ApiError> {
    if check_self_change(session.user_id, target, removes_admin) {
        Ok(())
    } else {
        Err(ApiError::new(
            req_id,
            "forbidden",
            "admins cannot demote, deactivate, or delete themselves",
        ))
    }
}

pub(in crate::api) async fn list_users(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<UserQuery>,
) -> Result<Json<ApiResponse<Page<AdminUserItem>>>, ApiError> {
    let role = query
        .role
        .as_deref()
        .map(str::parse::<Role>)
        .transpose()
        .map_err(|e| validation_error(req_id.0.clone(), &e))?;
    let search = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty());

    let filters = UserListFilters {
        search,
        role,
        is_active: query.is_active,
        limit: normalize_limit(query.limit),
        offset: normalize_offset(query.offset),
    };

    let rows = amezprice_db::list_users(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let total = amezprice_db::count_users(&state.pool, &filters)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        Page {
            items: rows.into_iter().map(AdminUserItem::from).collect(),
            total,
            limit: filters.limit,
            offset: filters.offset,
        },
        req_id.0,
    ))
}

pub(in crate::api) async fn get_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<AdminUserItem>>, ApiError> {
    let user = load_target(&state, &req_id.0, id).await?;
    Ok(ApiResponse::new(AdminUserItem::from(user), req_id.0))
}

pub(in crate::api) async fn update_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Path(id): Path<i64>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<ApiResponse<AdminUserItem>>, ApiError> {
    if patch.role.is_none() && patch.is_active.is_none() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "nothing to update: provide role and/or is_active",
        ));
    }

    let target = load_target(&state, &req_id.0, id).await?;
    enforce_self_rule(&req_id.0, &session, &target, removes_admin(&target, &patch))?;

    let updated = amezprice_db::update_user_admin_fields(
        &state.pool,
        id,
        UserAdminUpdate {
            role: patch.role,
            is_active: patch.is_active,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if patch.is_active == Some(false) {
        match amezprice_db::delete_user_sessions(&state.pool, id).await {
            Ok(dropped) => tracing::info!(user_id = id, dropped, "signed out deactivated user"),
            Err(e) => tracing::warn!(user_id = id, error = %e, "failed to drop sessions"),
        }
    }

    tracing::info!(
        admin_id = session.user_id,
        user_id = id,
        role = %updated.role,
        is_active = updated.is_active,
        "user updated by admin"
    );
    record_activity(
        &state.pool,
        LogLevel::Info,
        "admin",
        &format!("{} updated user {}", session.username, updated.username),
        Some(session.user_id),
        json!({ "target_user_id": id, "role": updated.role, "is_active": updated.is_active }),
    )
    .await;

    Ok(ApiResponse::new(AdminUserItem::from(updated), req_id.0))
}

pub(in crate::api) async fn delete_user(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let target = load_target(&state, &req_id.0, id).await?;
    enforce_self_rule(&req_id.0, &session, &target, true)?;

    amezprice_db::delete_user(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(admin_id = session.user_id, user_id = id, "user deleted by admin");
    record_activity(
        &state.pool,
        LogLevel::Warning,
        "admin",
        &format!("{} deleted user {}", session.username, target.username),
        Some(session.user_id),
        json!({ "target_user_id": id, "email": target.email }),
    )
    .await;

    Ok(ApiResponse::new(json!({ "deleted": true, "id": id }), req_id.0))
}
