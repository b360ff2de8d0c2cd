use amezprice_db::{TrackedProductRow, TrackingRow, TrackingUpdate};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::middleware::{CurrentSession, RequestId};

use super::{double_option, map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(super) struct TrackingItem {
    product_id: i64,
    email_alert: bool,
    push_alert: bool,
    price_threshold: Option<Decimal>,
    last_alerted_at: Option<DateTime<Utc>>,
}

impl From<TrackingRow> for TrackingItem {
    fn from(row: TrackingRow) -> Self {
        Self {
            product_id: row.product_id,
            email_alert: row.email_alert,
            push_alert: row.push_alert,
            price_threshold: row.price_threshold,
            last_alerted_at: row.last_alerted_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct TrackedProductItem {
    product_id: i64,
    marketplace: String,
    source_product_id: String,
    name: String,
    url: String,
    image_url: Option<String>,
    current_price: Option<Decimal>,
    highest_price: Option<Decimal>,
    lowest_price: Option<Decimal>,
    stock_status: String,
    last_checked_at: Option<DateTime<Utc>>,
    email_alert: bool,
    push_alert: bool,
    price_threshold: Option<Decimal>,
    tracked_since: DateTime<Utc>,
}

impl From<TrackedProductRow> for TrackedProductItem {
    fn from(row: TrackedProductRow) -> Self {
        Self {
            product_id: row.product_id,
            marketplace: row.marketplace,
            source_product_id: row.source_product_id,
            name: row.name,
            url: row.affiliate_url,
            image_url: row.image_url,
            current_price: row.current_price,
            highest_price: row.highest_price,
            lowest_price: row.lowest_price,
            stock_status: row.stock_status,
            last_checked_at: row.last_checked_at,
            email_alert: row.email_alert,
            push_alert: row.push_alert,
            price_threshold: row.price_threshold,
            tracked_since: row.tracked_since,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TrackingPatch {
    email_alert: Option<bool>,
    push_alert: Option<bool>,
    /// `null` clears the threshold; an absent field leaves it alone.
    #[serde(default, deserialize_with = "double_option")]
    price_threshold: Option<Option<Decimal>>,
}

pub(super) async fn list_tracked(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
) -> Result<Json<ApiResponse<Vec<TrackedProductItem>>>, ApiError> {
    let rows = amezprice_db::list_tracked_products(&state.pool, session.user_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        rows.into_iter().map(TrackedProductItem::from).collect(),
        req_id.0,
    ))
}

pub(super) async fn update_tracked(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Path(product_id): Path<i64>,
    Json(body): Json<TrackingPatch>,
) -> Result<Json<ApiResponse<TrackingItem>>, ApiError> {
    if let Some(Some(threshold)) = body.price_threshold {
        if threshold <= Decimal::ZERO {
            return Err(ApiError::new(
                req_id.0,
                "validation_error",
                "price_threshold: must be greater than zero",
            ));
        }
    }

    let row = amezprice_db::update_tracking(
        &state.pool,
        session.user_id,
        product_id,
        TrackingUpdate {
            email_alert: body.email_alert,
            push_alert: body.push_alert,
            price_threshold: body.price_threshold,
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(TrackingItem::from(row), req_id.0))
}

pub(super) async fn untrack(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<CurrentSession>,
    Path(product_id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let removed = amezprice_db::untrack_product(&state.pool, session.user_id, product_id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    if !removed {
        return Err(ApiError::new(req_id.0, "not_found", "product is not tracked"));
    }
    Ok(ApiResponse::new(json!({ "product_id": product_id }), req_id.0))
}
