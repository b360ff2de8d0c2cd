use amezprice_db::DashboardStats;
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::middleware::RequestId;

use super::super::{map_db_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Serialize)]
pub(in crate::api) struct DashboardItem {
    users: UserCounts,
    products: ProductCounts,
    tracked_products: i64,
    tracking_rows: i64,
    push_subscriptions: i64,
    price_points_today: i64,
    promotions_sent: i64,
    last_refresh_status: Option<String>,
    last_refresh_at: Option<DateTime<Utc>>,
    push_enabled: bool,
    email_enabled: bool,
}

#[derive(Debug, Serialize)]
struct UserCounts {
    total: i64,
    active: i64,
    admins: i64,
    new_last_7_days: i64,
}

#[derive(Debug, Serialize)]
struct ProductCounts {
    total: i64,
    amazon: i64,
    flipkart: i64,
    out_of_stock: i64,
}

impl DashboardItem {
    fn new(stats: DashboardStats, push_enabled: bool, email_enabled: bool) -> Self {
        Self {
            users: UserCounts {
                total: stats.total_users,
                active: stats.active_users,
                admins: stats.admin_users,
                new_last_7_days: stats.new_users_7d,
            },
            products: ProductCounts {
                total: stats.total_products,
                amazon: stats.amazon_products,
                flipkart: stats.flipkart_products,
                out_of_stock: stats.out_of_stock_products,
            },
            tracked_products: stats.tracked_products,
            tracking_rows: stats.tracking_rows,
            push_subscriptions: stats.push_subscriptions,
            price_points_today: stats.price_points_today,
            promotions_sent: stats.promotions_sent,
            last_refresh_status: stats.last_refresh_status,
            last_refresh_at: stats.last_refresh_at,
            push_enabled,
            email_enabled,
        }
    }
}

pub(in crate::api) async fn dashboard(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<DashboardItem>>, ApiError> {
    let stats = amezprice_db::dashboard_stats(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let notifier = &state.tracker.notifier;
    Ok(ApiResponse::new(
        DashboardItem::new(
            stats,
            notifier.push.is_enabled(),
            notifier.email.is_enabled(),
        ),
        req_id.0,
    ))
}
