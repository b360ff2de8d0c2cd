use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use amezprice_core::Role;
use axum::{
    extract::{Request, State},
    http::{
        header::{HeaderValue, SET_COOKIE},
        Method,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::{map_db_error, ApiError, AppState};
use crate::session::{hash_token, random_token, session_cookie, session_token, SESSION_COOKIE};

pub const CSRF_HEADER: &str = "x-csrf-token";

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The signed-in user behind a request.
#[derive(Debug, Clone)]
pub struct CurrentSession {
    pub session_id: i64,
    pub csrf_token: String,
    pub user_id: i64,
    pub user_public_id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

impl CurrentSession {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Inserted by [`load_session`] on every request; `None` for anonymous ones.
#[derive(Debug, Clone, Default)]
pub struct MaybeSession(pub Option<CurrentSession>);

#[derive(Debug, Clone)]
struct RateLimitWindow {
    started_at: Instant,
    count: usize,
}

/// Fixed-window limiter shared by every request through one layer.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    max_requests: usize,
    window: Duration,
    state: Arc<Mutex<RateLimitWindow>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            state: Arc::new(Mutex::new(RateLimitWindow {
                started_at: Instant::now(),
                count: 0,
            })),
        }
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(|| "unknown".to_owned(), |id| id.0.clone())
}

fn session_of(req: &Request) -> Option<CurrentSession> {
    req.extensions()
        .get::<MaybeSession>()
        .and_then(|s| s.0.clone())
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Resolves the session cookie into a [`MaybeSession`] extension.
///
/// Tokens older than the rotation interval are replaced and the new cookie
/// is set on the response, unless the handler already set one (login,
/// logout).
pub async fn load_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = session_token(req.headers()) else {
        req.extensions_mut().insert(MaybeSession(None));
        return next.run(req).await;
    };

    let req_id = request_id_of(&req);
    let presented_hash = hash_token(&token);
    let row = match amezprice_db::get_active_session(&state.pool, &presented_hash).await {
        Ok(Some(row)) => row,
        Ok(None) => {
            req.extensions_mut().insert(MaybeSession(None));
            return next.run(req).await;
        }
        Err(e) => return map_db_error(req_id, &e).into_response(),
    };

    let role = match row.role.parse::<Role>() {
        Ok(role) => role,
        Err(e) => {
            tracing::error!(user_id = row.user_id, error = %e, "session user has unknown role");
            return ApiError::new(req_id, "internal_error", "invalid session").into_response();
        }
    };

    let now = Utc::now();
    let mut rotated_token = None;
    if now - row.rotated_at >= state.sessions.rotate_after() {
        let new_token = random_token();
        match amezprice_db::rotate_session_token(
            &state.pool,
            row.session_id,
            &presented_hash,
            &hash_token(&new_token),
            now + state.sessions.ttl(),
        )
        .await
        {
            Ok(true) => rotated_token = Some(new_token),
            // A concurrent request rotated first; its cookie wins.
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(session_id = row.session_id, error = %e, "session rotation failed");
            }
        }
    } else if let Err(e) = amezprice_db::touch_session(&state.pool, row.session_id).await {
        tracing::warn!(session_id = row.session_id, error = %e, "failed to touch session");
    }

    req.extensions_mut().insert(MaybeSession(Some(CurrentSession {
        session_id: row.session_id,
        csrf_token: row.csrf_token,
        user_id: row.user_id,
        user_public_id: row.user_public_id,
        username: row.username,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
        role,
    })));

    let mut res = next.run(req).await;

    if let Some(token) = rotated_token {
        let handler_set_cookie = res
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.starts_with(SESSION_COOKIE));
        if !handler_set_cookie {
            if let Ok(val) = HeaderValue::from_str(&session_cookie(&token, &state.sessions)) {
                res.headers_mut().append(SET_COOKIE, val);
            }
        }
    }

    res
}

/// Rejects anonymous requests and exposes [`CurrentSession`] to handlers.
pub async fn require_session(mut req: Request, next: Next) -> Response {
    match session_of(&req) {
        Some(session) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        None => ApiError::new(request_id_of(&req), "unauthorized", "sign in required")
            .into_response(),
    }
}

/// Like [`require_session`], and the user must be an admin.
pub async fn require_admin(mut req: Request, next: Next) -> Response {
    match session_of(&req) {
        Some(session) if session.is_admin() => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Some(session) => {
            tracing::warn!(
                user_id = session.user_id,
                path = %req.uri().path(),
                "non-admin denied admin route"
            );
            ApiError::new(request_id_of(&req), "forbidden", "admin access required")
                .into_response()
        }
        None => ApiError::new(request_id_of(&req), "unauthorized", "sign in required")
            .into_response(),
    }
}

fn csrf_matches(expected: &str, presented: Option<&str>) -> bool {
    presented.is_some_and(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
}

/// State-changing requests made with a session must echo its CSRF token in
/// the `x-csrf-token` header. Anonymous requests pass through.
pub async fn verify_csrf(req: Request, next: Next) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }
    let Some(session) = session_of(&req) else {
        return next.run(req).await;
    };

    let presented = req.headers().get(CSRF_HEADER).and_then(|v| v.to_str().ok());
    if csrf_matches(&session.csrf_token, presented) {
        next.run(req).await
    } else {
        tracing::warn!(
            user_id = session.user_id,
            path = %req.uri().path(),
            "CSRF token mismatch"
        );
        ApiError::new(request_id_of(&req), "csrf_failed", "missing or invalid CSRF token")
            .into_response()
    }
}

/// Middleware enforcing a fixed request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let mut window = rate_limit.state.lock().await;
    let elapsed = window.started_at.elapsed();

    if elapsed >= rate_limit.window {
        window.started_at = Instant::now();
        window.count = 0;
    }

    if window.count >= rate_limit.max_requests {
        drop(window);
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    window.count += 1;
    drop(window);

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csrf_requires_exact_token() {
        assert!(csrf_matches("abc123", Some("abc123")));
        assert!(!csrf_matches("abc123", Some("abc124")));
        assert!(!csrf_matches("abc123", Some("abc")));
        assert!(!csrf_matches("abc123", None));
    }

    #[tokio::test]
    async fn rate_limit_rejects_once_window_is_full() {
        use axum::{body::Body, http::Request as HttpRequest, http::StatusCode, routing::get, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                RateLimitState::new(1, Duration::from_secs(60)),
                enforce_rate_limit,
            ));

        let first = app
            .clone()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
