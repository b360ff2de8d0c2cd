use amezprice_core::Marketplace;
use amezprice_db::{PricePointRow, ProductListFilters, ProductRow};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{
    map_db_error, normalize_limit, normalize_offset, ApiError, ApiResponse, AppState,
};

const DEFAULT_HISTORY_DAYS: i64 = 90;
const MAX_HISTORY_DAYS: i64 = 730;

#[derive(Debug, Serialize)]
pub(super) struct ProductItem {
    product_id: i64,
    marketplace: String,
    source_product_id: String,
    name: String,
    url: String,
    image_url: Option<String>,
    category: Option<String>,
    currency_code: String,
    current_price: Option<Decimal>,
    mrp: Option<Decimal>,
    highest_price: Option<Decimal>,
    lowest_price: Option<Decimal>,
    stock_status: String,
    rating: Option<Decimal>,
    rating_count: Option<i32>,
    last_checked_at: Option<DateTime<Utc>>,
}

impl From<ProductRow> for ProductItem {
    fn from(row: ProductRow) -> Self {
        Self {
            product_id: row.id,
            marketplace: row.marketplace,
            source_product_id: row.source_product_id,
            name: row.name,
            url: row.affiliate_url,
            image_url: row.image_url,
            category: row.category,
            currency_code: row.currency_code,
            current_price: row.current_price,
            mrp: row.mrp,
            highest_price: row.highest_price,
            lowest_price: row.lowest_price,
            stock_status: row.stock_status,
            rating: row.rating,
            rating_count: row.rating_count,
            last_checked_at: row.last_checked_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct PricePointItem {
    date: NaiveDate,
    price: Decimal,
    day_high: Decimal,
    day_low: Decimal,
    in_stock: bool,
}

impl From<PricePointRow> for PricePointItem {
    fn from(row: PricePointRow) -> Self {
        Self {
            date: row.recorded_on,
            price: row.price,
            day_high: row.day_high,
            day_low: row.day_low,
            in_stock: row.in_stock,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ProductQuery {
    pub marketplace: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoryQuery {
    pub days: Option<i64>,
}

fn parse_marketplace(req_id: &str, raw: &str) -> Result<Marketplace, ApiError> {
    raw.parse::<Marketplace>()
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))
}

async fn find_product(
    state: &AppState,
    req_id: &str,
    marketplace: &str,
    source_id: &str,
) -> Result<ProductRow, ApiError> {
    let marketplace = parse_marketplace(req_id, marketplace)?;
    amezprice_db::get_product_by_source(&state.pool, marketplace, &source_id.to_ascii_uppercase())
        .await
        .map_err(|e| map_db_error(req_id.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(req_id, "not_found", "product not found"))
}

pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<ApiResponse<Vec<ProductItem>>>, ApiError> {
    let marketplace = query
        .marketplace
        .as_deref()
        .map(|m| parse_marketplace(&req_id.0, m))
        .transpose()?;

    let rows = amezprice_db::list_products(
        &state.pool,
        &ProductListFilters {
            marketplace,
            search: query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            limit: normalize_limit(query.limit),
            offset: normalize_offset(query.offset),
        },
    )
    .await
    .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        rows.into_iter().map(ProductItem::from).collect(),
        req_id.0,
    ))
}

pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((marketplace, source_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<ProductItem>>, ApiError> {
    let row = find_product(&state, &req_id.0, &marketplace, &source_id).await?;
    Ok(ApiResponse::new(ProductItem::from(row), req_id.0))
}

pub(super) async fn get_price_history(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((marketplace, source_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<PricePointItem>>>, ApiError> {
    let product = find_product(&state, &req_id.0, &marketplace, &source_id).await?;

    let days = query
        .days
        .unwrap_or(DEFAULT_HISTORY_DAYS)
        .clamp(1, MAX_HISTORY_DAYS);
    let since = Utc::now().date_naive() - Duration::days(days - 1);
    let rows = amezprice_db::list_price_history(&state.pool, product.id, Some(since), days)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(ApiResponse::new(
        rows.into_iter().map(PricePointItem::from).collect(),
        req_id.0,
    ))
}
