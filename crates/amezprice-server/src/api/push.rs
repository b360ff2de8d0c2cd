use amezprice_db::NewPushSubscription;
use amezprice_notify::push::decode_b64url;
use axum::{extract::State, http::HeaderMap, Extension, Json};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::middleware::{CurrentSession, RequestId};
use crate::session::user_agent;

use super::{map_db_error, ApiError, ApiResponse, AppState};

const MAX_ENDPOINT_LEN: usize = 2048;

#[derive(Debug, Serialize)]
pub(super) struct VapidKeyItem {
    enabled: bool,
    public_key: Option<String>,
}

/// Browser `PushSubscription.toJSON()` shape.
#[derive(Debug, Deserialize)]
pub(super) struct SubscribeRequest {
    endpoint: String,
    keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub(super) struct SubscriptionKeys {
    p256dh: String,
    auth: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct UnsubscribeRequest {
    endpoint: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SubscriptionItem {
    subscription_id: i64,
    endpoint: String,
    created_at: DateTime<Utc>,
}

/// Checks the endpoint is an HTTPS URL and the keys decode to a P-256 point
/// and a 16-byte auth secret.
fn validate_subscription(body: &SubscribeRequest) -> Result<(), &'static str> {
    let endpoint = body.endpoint.trim();
    if endpoint.len() > MAX_ENDPOINT_LEN {
        return Err("endpoint: too long");
    }
    match Url::parse(endpoint) {
        Ok(url) if url.scheme() == "https" && url.host_str().is_some() => {}
        _ => return Err("endpoint: must be an https URL"),
    }
    match decode_b64url(&body.keys.p256dh) {
        Ok(bytes) if bytes.len() == 65 && bytes[0] == 0x04 => {}
        _ => return Err("keys.p256dh: must be an uncompressed P-256 public key"),
    }
    match decode_b64url(&body.keys.auth) {
        Ok(bytes) if bytes.len() == 16 => {}
        _ => return Err("keys.auth: must be 16 bytes"),
    }
    Ok(())
}

pub(super) async fn vapid_public_key(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<VapidKeyItem>> {
    let public_key = state
        .tracker
        .notifier
        .push
        .vapid_public_key()
        .map(str::to_owned);
    ApiResponse::new(
        VapidKeyItem {
            enabled: public_key.is_some(),
            public_key,
        },
        req_id.0,
    )
}

pub(super) async fn subscribe(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    headers: HeaderMap,
    Json(body): Json<SubscribeRequest>,
) -> Result<Json<ApiResponse<SubscriptionItem>>, ApiError> {
    validate_subscription(&body)
        .map_err(|reason| ApiError::new(req_id.0.clone(), "validation_error", reason))?;

    let agent = user_agent(&headers);
    let row = amezprice_db::upsert_push_subscription(
        &state.pool,
        &NewPushSubscription {
            user_id: session.user_id,
            endpoint: body.endpoint.trim(),
            p256dh: body.keys.p256dh.trim(),
            auth_secret: body.keys.auth.trim(),
            user_agent: agent.as_deref(),
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(user_id = session.user_id, subscription_id = row.id, "push subscription saved");
    Ok(ApiResponse::new(
        SubscriptionItem {
            subscription_id: row.id,
            endpoint: row.endpoint,
            created_at: row.created_at,
        },
        req_id.0,
    ))
}

pub(super) async fn unsubscribe(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Json(body): Json<UnsubscribeRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let removed = amezprice_db::delete_push_subscription_by_endpoint(
        &state.pool,
        session.user_id,
        body.endpoint.trim(),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if !removed {
        return Err(ApiError::new(req_id.0, "not_found", "subscription not found"));
    }
    Ok(ApiResponse::new(json!({ "removed": true }), req_id.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use amezprice_notify::push::generate_keys;

    fn request(endpoint: &str, auth: &str) -> SubscribeRequest {
        let (p256dh, _) = generate_keys();
        SubscribeRequest {
            endpoint: endpoint.to_owned(),
            keys: SubscriptionKeys {
                p256dh,
                auth: auth.to_owned(),
            },
        }
    }

    #[test]
    fn accepts_browser_subscription() {
        let body = request(
            "https://fcm.googleapis.com/fcm/send/abc123",
            "AAECAwQFBgcICQoLDA0ODw",
        );
        assert_eq!(validate_subscription(&body), Ok(()));
    }

    #[test]
    fn rejects_plain_http_endpoint() {
        let body = request("http://push.example/abc", "AAECAwQFBgcICQoLDA0ODw");
        assert!(validate_subscription(&body).unwrap_err().starts_with("endpoint"));
    }

    #[test]
    fn rejects_short_auth_secret() {
        let body = request("https://push.example/abc", "AAECAw");
        assert!(validate_subscription(&body).unwrap_err().starts_with("keys.auth"));
    }
}
