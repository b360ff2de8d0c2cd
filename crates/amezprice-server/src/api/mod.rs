mod admin;
mod auth;
mod products;
mod push;
mod search;
mod tracking;

use std::sync::Arc;
use std::time::Duration;

use amezprice_core::CoreError;
use amezprice_db::DbError;
use amezprice_marketplace::MarketplaceError;
use amezprice_tracker::{TrackerContext, TrackerError};
use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use crate::middleware::{
    enforce_rate_limit, load_session, request_id, require_admin, require_session, verify_csrf,
    RateLimitState, RequestId, CSRF_HEADER,
};
use crate::session::SessionSettings;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub tracker: Arc<TrackerContext>,
    pub sessions: SessionSettings,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// A page of results plus the unpaged total.
#[derive(Debug, Serialize)]
pub(super) struct Page<T: Serialize> {
    items: Vec<T>,
    total: i64,
    limit: i64,
    offset: i64,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(super) fn new(data: T, request_id: String) -> Json<Self> {
        Json(Self {
            data,
            meta: ResponseMeta::new(request_id),
        })
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }

    fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" | "csrf_failed" => StatusCode::FORBIDDEN,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status(), Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn normalize_offset(offset: Option<i64>) -> i64 {
    offset.unwrap_or(0).max(0)
}

pub(crate) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    match error {
        DbError::NotFound => ApiError::new(request_id, "not_found", "record not found"),
        DbError::LastActiveAdmin => {
            ApiError::new(request_id, "conflict", "the last active admin cannot be removed")
        }
        DbError::RefreshRunInProgress => {
            ApiError::new(request_id, "conflict", "a refresh run is already in progress")
        }
        e if e.is_unique_violation() => {
            ApiError::new(request_id, "conflict", "record already exists")
        }
        e => {
            tracing::error!(error = %e, "database query failed");
            ApiError::new(request_id, "internal_error", "database query failed")
        }
    }
}

pub(super) fn validation_error(request_id: String, error: &CoreError) -> ApiError {
    ApiError::new(request_id, "validation_error", error.to_string())
}

pub(super) fn map_tracker_error(request_id: String, error: &TrackerError) -> ApiError {
    match error {
        TrackerError::Db(e) => map_db_error(request_id, e),
        TrackerError::Marketplace(e) => match e {
            MarketplaceError::InvalidUrl { .. }
            | MarketplaceError::UnsupportedMarketplace { .. }
            | MarketplaceError::IdentifierNotFound { .. }
            | MarketplaceError::TooManyRedirects { .. } => {
                ApiError::new(request_id, "validation_error", e.to_string())
            }
            MarketplaceError::NotFound { .. } => {
                ApiError::new(request_id, "not_found", e.to_string())
            }
            MarketplaceError::NotConfigured(_) => {
                ApiError::new(request_id, "service_unavailable", e.to_string())
            }
            other => {
                tracing::warn!(error = %other, "marketplace request failed");
                ApiError::new(request_id, "bad_gateway", "marketplace request failed")
            }
        },
        TrackerError::MarketplaceUnavailable(_) => {
            ApiError::new(request_id, "service_unavailable", error.to_string())
        }
        TrackerError::MarketplaceMismatch { .. } => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        TrackerError::Notify(_) | TrackerError::RefreshFailed { .. } => {
            tracing::error!(error = %error, "tracker operation failed");
            ApiError::new(request_id, "internal_error", "operation failed")
        }
    }
}

/// Tells an absent field (`None`) apart from an explicit `null`
/// (`Some(None)`) in PATCH bodies.
pub(super) fn double_option<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER),
            HeaderName::from_static("x-request-id"),
        ])
}

fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/push/vapid-public-key", get(push::vapid_public_key))
        .route("/api/v1/products", get(products::list_products))
        .route(
            "/api/v1/products/{marketplace}/{source_id}",
            get(products::get_product),
        )
        .route(
            "/api/v1/products/{marketplace}/{source_id}/history",
            get(products::get_price_history),
        )
}

fn auth_router(rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .layer(axum::middleware::from_fn_with_state(
            rate_limit,
            enforce_rate_limit,
        ))
}

fn search_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/search", post(search::search))
        .layer(axum::middleware::from_fn(verify_csrf))
}

fn session_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/session", get(auth::current_session))
        .route("/api/v1/me/tracked", get(tracking::list_tracked))
        .route(
            "/api/v1/me/tracked/{product_id}",
            patch(tracking::update_tracked).delete(tracking::untrack),
        )
        .route(
            "/api/v1/me/push-subscriptions",
            post(push::subscribe).delete(push::unsubscribe),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(require_session))
                .layer(axum::middleware::from_fn(verify_csrf)),
        )
}

fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/admin/dashboard", get(admin::dashboard))
        .route("/api/v1/admin/users", get(admin::list_users))
        .route(
            "/api/v1/admin/users/{id}",
            get(admin::get_user)
                .patch(admin::update_user)
                .delete(admin::delete_user),
        )
        .route(
            "/api/v1/admin/logs",
            get(admin::list_logs).delete(admin::purge_logs),
        )
        .route(
            "/api/v1/admin/promotions",
            get(admin::list_promotions).post(admin::create_promotion),
        )
        .route("/api/v1/admin/promotions/{id}", get(admin::get_promotion))
        .route(
            "/api/v1/admin/refresh-runs",
            get(admin::list_refresh_runs).post(admin::trigger_refresh),
        )
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(require_admin))
                .layer(axum::middleware::from_fn(verify_csrf)),
        )
}

/// Rate limits for the auth endpoints and for everything else.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub auth: RateLimitState,
    pub general: RateLimitState,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            auth: RateLimitState::new(20, Duration::from_secs(60)),
            general: RateLimitState::new(120, Duration::from_secs(60)),
        }
    }
}

pub fn build_app(state: AppState, rate_limits: RateLimits) -> Router {
    Router::new()
        .merge(public_router())
        .merge(auth_router(rate_limits.auth))
        .merge(search_router())
        .merge(session_router())
        .merge(admin_router())
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id))
                .layer(axum::middleware::from_fn_with_state(
                    rate_limits.general,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    load_session,
                )),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match amezprice_db::health_check(&state.pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;
