use std::sync::Arc;

use amezprice_core::{PromotionAudience, PromotionChannel};
use amezprice_db::{LogLevel, NewPromotion, PromotionRecipientRow, PromotionRow};
use amezprice_tracker::{dispatch_promotion, record_activity};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::middleware::{CurrentSession, RequestId};

use super::super::{
    map_db_error, normalize_limit, normalize_offset, ApiError, ApiResponse, AppState,
};

const SUBJECT_MAX: usize = 200;
const BODY_MAX: usize = 5000;
const SELECTED_MAX: usize = 10_000;
const RECIPIENTS_SHOWN: i64 = 1000;

#[derive(Debug, Serialize)]
pub(in crate::api) struct PromotionItem {
    id: i64,
    promotion_id: Uuid,
    subject: String,
    body: String,
    link_url: Option<String>,
    channel: String,
    audience: String,
    selected_user_ids: Vec<i64>,
    status: String,
    created_by: Option<i64>,
    recipients_total: i32,
    emails_sent: i32,
    pushes_sent: i32,
    failures: i32,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<PromotionRow> for PromotionItem {
    fn from(row: PromotionRow) -> Self {
        Self {
            id: row.id,
            promotion_id: row.public_id,
            subject: row.subject,
            body: row.body,
            link_url: row.link_url,
            channel: row.channel,
            audience: row.audience,
            selected_user_ids: row.selected_user_ids,
            status: row.status,
            created_by: row.created_by,
            recipients_total: row.recipients_total,
            emails_sent: row.emails_sent,
            pushes_sent: row.pushes_sent,
            failures: row.failures,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct RecipientItem {
    user_id: i64,
    channel: String,
    status: String,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PromotionRecipientRow> for RecipientItem {
    fn from(row: PromotionRecipientRow) -> Self {
        Self {
            user_id: row.user_id,
            channel: row.channel,
            status: row.status,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(in crate::api) struct PromotionDetail {
    promotion: PromotionItem,
    recipients: Vec<RecipientItem>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct PromotionQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct PromotionRequest {
    subject: String,
    body: String,
    link_url: Option<String>,
    channel: PromotionChannel,
    audience: PromotionAudience,
    #[serde(default)]
    selected_user_ids: Vec<i64>,
}

/// Returns `field: reason` for the first invalid field.
fn validate_promotion(request: &PromotionRequest) -> Result<(), String> {
    let subject = request.subject.trim();
    if subject.is_empty() || subject.chars().count() > SUBJECT_MAX {
        return Err(format!("subject: must be 1-{SUBJECT_MAX} characters"));
    }
    let body = request.body.trim();
    if body.is_empty() || body.chars().count() > BODY_MAX {
        return Err(format!("body: must be 1-{BODY_MAX} characters"));
    }
    if let Some(link) = request.link_url.as_deref().filter(|l| !l.trim().is_empty()) {
        match Url::parse(link.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err("link_url: must be an http(s) URL".to_owned()),
        }
    }
    if request.audience == PromotionAudience::Selected {
        if request.selected_user_ids.is_empty() {
            return Err("selected_user_ids: required when audience is 'selected'".to_owned());
        }
        if request.selected_user_ids.len() > SELECTED_MAX {
            return Err(format!("selected_user_ids: at most {SELECTED_MAX} ids"));
        }
    }
    Ok(())
}

pub(in crate::api) async fn list_promotions(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<PromotionQuery>,
) -> Result<Json<ApiResponse<Vec<PromotionItem>>>, ApiError> {
    let rows = amezprice_db::list_promotions(
        &state.pool,
        normalize_limit(query.limit),
        normalize_offset(query.offset),
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        rows.into_iter().map(PromotionItem::from).collect(),
        req_id.0,
    ))
}

pub(in crate::api) async fn get_promotion(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<PromotionDetail>>, ApiError> {
    let promotion = amezprice_db::get_promotion(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;
    let recipients = amezprice_db::list_promotion_recipients(&state.pool, id, RECIPIENTS_SHOWN)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        PromotionDetail {
            promotion: promotion.into(),
            recipients: recipients.into_iter().map(RecipientItem::from).collect(),
        },
        req_id.0,
    ))
}

/// Stores the promotion and dispatches it in the background. The response
/// carries the queued row; poll `GET /admin/promotions/{id}` for progress.
pub(in crate::api) async fn create_promotion(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Json(request): Json<PromotionRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PromotionItem>>), ApiError> {
    validate_promotion(&request)
        .map_err(|message| ApiError::new(req_id.0.clone(), "validation_error", message))?;

    let link_url = request
        .link_url
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let row = amezprice_db::create_promotion(
        &state.pool,
        &NewPromotion {
            subject: request.subject.trim(),
            body: request.body.trim(),
            link_url,
            channel: request.channel,
            audience: request.audience,
            selected_user_ids: &request.selected_user_ids,
            created_by: Some(session.user_id),
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(
        promotion_id = row.id,
        admin_id = session.user_id,
        channel = %row.channel,
        audience = %row.audience,
        "promotion queued"
    );
    record_activity(
        &state.pool,
        LogLevel::Info,
        "admin",
        &format!("{} queued promotion '{}'", session.username, row.subject),
        Some(session.user_id),
        json!({ "promotion_id": row.id }),
    )
    .await;

    let tracker = Arc::clone(&state.tracker);
    let promotion_id = row.id;
    tokio::spawn(async move {
        if let Err(e) = dispatch_promotion(&tracker, promotion_id).await {
            tracing::error!(promotion_id, error = %e, "promotion dispatch failed");
        }
    });

    Ok((StatusCode::ACCEPTED, ApiResponse::new(row.into(), req_id.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(audience: PromotionAudience, selected: Vec<i64>) -> PromotionRequest {
        PromotionRequest {
            subject: "Diwali deals".to_owned(),
            body: "Prices dropped on your wishlist.".to_owned(),
            link_url: Some("https://amezprice.example/deals".to_owned()),
            channel: PromotionChannel::Both,
            audience,
            selected_user_ids: selected,
        }
    }

    #[test]
    fn accepts_broadcast_and_selected_audiences() {
        assert!(validate_promotion(&request(PromotionAudience::All, vec![])).is_ok());
        assert!(validate_promotion(&request(PromotionAudience::Selected, vec![3, 4])).is_ok());
    }

    #[test]
    fn selected_audience_needs_ids() {
        let err = validate_promotion(&request(PromotionAudience::Selected, vec![])).unwrap_err();
        assert!(err.starts_with("selected_user_ids"));
    }

    #[test]
    fn rejects_blank_subject_and_bad_link() {
        let mut blank = request(PromotionAudience::All, vec![]);
        blank.subject = "   ".to_owned();
        assert!(validate_promotion(&blank).unwrap_err().starts_with("subject"));

        let mut bad_link = request(PromotionAudience::All, vec![]);
        bad_link.link_url = Some("javascript:alert(1)".to_owned());
        assert!(validate_promotion(&bad_link).unwrap_err().starts_with("link_url"));
    }

    #[test]
    fn channel_and_audience_parse_lowercase() {
        let parsed: PromotionRequest = serde_json::from_value(json!({
            "subject": "s",
            "body": "b",
            "channel": "push",
            "audience": "selected",
            "selected_user_ids": [7]
        }))
        .unwrap();
        assert_eq!(parsed.channel, PromotionChannel::Push);
        assert_eq!(parsed.audience, PromotionAudience::Selected);
        assert!(parsed.link_url.is_none());
    }
}
