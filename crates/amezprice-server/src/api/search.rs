use amezprice_tracker::{search_product, ProductSource};
use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};

use crate::middleware::{MaybeSession, RequestId};

use super::products::ProductItem;
use super::tracking::TrackingItem;
use super::{map_tracker_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SearchRequest {
    url: String,
}

#[derive(Debug, Serialize)]
pub(super) struct SearchItem {
    product: ProductItem,
    source: ProductSource,
    /// URL after short-link resolution.
    resolved_url: String,
    /// Present when the caller is signed in; the product is now tracked.
    tracking: Option<TrackingItem>,
}

pub(super) async fn search(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Extension(session): Extension<MaybeSession>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<ApiResponse<SearchItem>>, ApiError> {
    let user_id = session.0.as_ref().map(|s| s.user_id);

    let outcome = search_product(&state.tracker, &body.url, user_id)
        .await
        .map_err(|e| map_tracker_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        SearchItem {
            product: outcome.product.into(),
            source: outcome.source,
            resolved_url: outcome.resolved.resolved_url,
            tracking: outcome.tracking.map(TrackingItem::from),
        },
        req_id.0,
    ))
}
