use amezprice_core::users::{normalize_email, validate_email, validate_password, validate_username};
use amezprice_core::{hash_password, verify_password, Role, UNMATCHABLE_HASH};
use amezprice_db::{LogLevel, NewSession, NewUser, UserRow};
use amezprice_tracker::record_activity;
use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::middleware::{CurrentSession, MaybeSession, RequestId};
use crate::session::{
    clear_session_cookie, client_ip, hash_token, random_token, session_cookie, user_agent,
};

use super::{map_db_error, validation_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct RegisterRequest {
    first_name: String,
    #[serde(default)]
    last_name: String,
    username: String,
    email: String,
    password: String,
    phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct LoginRequest {
    /// Username or email.
    login: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub(super) struct UserItem {
    user_id: Uuid,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    role: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SessionItem {
    user: UserItem,
    csrf_token: String,
}

impl From<&UserRow> for UserItem {
    fn from(row: &UserRow) -> Self {
        Self {
            user_id: row.public_id,
            username: row.username.clone(),
            email: row.email.clone(),
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            role: row.role.clone(),
        }
    }
}

impl From<&CurrentSession> for UserItem {
    fn from(session: &CurrentSession) -> Self {
        Self {
            user_id: session.user_public_id,
            username: session.username.clone(),
            email: session.email.clone(),
            first_name: session.first_name.clone(),
            last_name: session.last_name.clone(),
            role: session.role.as_str().to_owned(),
        }
    }
}

async fn hash_blocking(req_id: &str, password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing task failed");
            ApiError::new(req_id, "internal_error", "password hashing failed")
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::new(req_id, "internal_error", "password hashing failed")
        })
}

pub(super) async fn register(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<UserItem>>), ApiError> {
    let username = body.username.trim();
    let email = normalize_email(&body.email);
    let first_name = body.first_name.trim();
    if first_name.is_empty() {
        return Err(ApiError::new(
            req_id.0,
            "validation_error",
            "first_name: must not be empty",
        ));
    }
    validate_username(username).map_err(|e| validation_error(req_id.0.clone(), &e))?;
    validate_email(&email).map_err(|e| validation_error(req_id.0.clone(), &e))?;
    validate_password(&body.password).map_err(|e| validation_error(req_id.0.clone(), &e))?;

    let password_hash = hash_blocking(&req_id.0, body.password).await?;
    let phone = body.phone.as_deref().map(str::trim).filter(|p| !p.is_empty());

    let user = amezprice_db::create_user(
        &state.pool,
        &NewUser {
            first_name,
            last_name: body.last_name.trim(),
            username,
            email: &email,
            phone,
            password_hash: &password_hash,
            role: Role::User,
        },
    )
    .await
    .map_err(|e| {
        if e.is_unique_violation() {
            ApiError::new(req_id.0.clone(), "conflict", "username or email already registered")
        } else {
            map_db_error(req_id.0.clone(), &e)
        }
    })?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");
    record_activity(
        &state.pool,
        LogLevel::Info,
        "auth",
        &format!("user {} registered", user.username),
        Some(user.id),
        json!({}),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        ApiResponse::new(UserItem::from(&user), req_id.0),
    ))
}

pub(super) async fn login(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(existing): Extension<MaybeSession>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invalid = || ApiError::new(req_id.0.clone(), "unauthorized", "invalid credentials");

    let user = amezprice_db::get_user_by_login(&state.pool, &body.login)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    // Unknown and inactive logins still run a full verification.
    let phc = match &user {
        Some(user) if user.is_active => user.password_hash.clone(),
        _ => UNMATCHABLE_HASH.to_owned(),
    };
    let password = body.password.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &phc))
        .await
        .unwrap_or(false);

    let Some(user) = user.filter(|u| verified && u.is_active) else {
        tracing::warn!(login = %body.login, "failed login attempt");
        record_activity(
            &state.pool,
            LogLevel::Warning,
            "auth",
            "failed login attempt",
            None,
            json!({ "login": body.login, "ip": client_ip(&headers) }),
        )
        .await;
        return Err(invalid());
    };

    // A fresh session on every login; the presented one is discarded.
    if let Some(previous) = existing.0 {
        if let Err(e) = amezprice_db::delete_session(&state.pool, previous.session_id).await {
            tracing::warn!(session_id = previous.session_id, error = %e, "failed to drop old session");
        }
    }

    let token = random_token();
    let csrf_token = random_token();
    let expires_at: DateTime<Utc> = Utc::now() + state.sessions.ttl();
    let ip = client_ip(&headers);
    let agent = user_agent(&headers);
    amezprice_db::create_session(
        &state.pool,
        &NewSession {
            user_id: user.id,
            token_hash: &hash_token(&token),
            csrf_token: &csrf_token,
            ip_address: ip.as_deref(),
            user_agent: agent.as_deref(),
            expires_at,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if let Err(e) = amezprice_db::touch_last_login(&state.pool, user.id).await {
        tracing::warn!(user_id = user.id, error = %e, "failed to stamp last login");
    }

    tracing::info!(user_id = user.id, "user signed in");
    record_activity(
        &state.pool,
        LogLevel::Info,
        "auth",
        &format!("user {} signed in", user.username),
        Some(user.id),
        json!({ "ip": ip }),
    )
    .await;

    let cookie = session_cookie(&token, &state.sessions);
    Ok((
        AppendHeaders([(SET_COOKIE, cookie)]),
        ApiResponse::new(
            SessionItem {
                user: UserItem::from(&user),
                csrf_token,
            },
            req_id.0,
        ),
    ))
}

pub(super) async fn logout(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
) -> Result<impl IntoResponse, ApiError> {
    amezprice_db::delete_session(&state.pool, session.session_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(user_id = session.user_id, "user signed out");
    Ok((
        AppendHeaders([(SET_COOKIE, clear_session_cookie(&state.sessions))]),
        ApiResponse::new(json!({ "signed_out": true }), req_id.0),
    ))
}

pub(super) async fn current_session(
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
) -> Json<ApiResponse<SessionItem>> {
    ApiResponse::new(
        SessionItem {
            user: UserItem::from(&session),
            csrf_token: session.csrf_token.clone(),
        },
        req_id.0,
    )
}
