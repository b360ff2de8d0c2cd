//! Orchestration on top of the db, marketplace and notify crates: product
//! search/ingestion, scheduled price refresh, alert fan-out and promotion
//! dispatch.

pub mod alerts;
pub mod error;
pub mod ingest;
pub mod promotions;
pub mod refresh;

use amezprice_core::AppConfig;
use amezprice_db::{LogLevel, NewActivityLog};
use amezprice_marketplace::{redirect_client, MarketplaceClients};
use amezprice_notify::Notifier;
use sqlx::PgPool;

pub use alerts::{dispatch_price_event, AlertSummary};
pub use error::TrackerError;
pub use ingest::{lookup_product, search_product, ProductLookup, ProductSource, SearchOutcome};
pub use promotions::dispatch_promotion;
pub use refresh::{execute_refresh_run, refresh_prices, RefreshOptions, RefreshSummary, RefreshTrigger};

/// Tunables the pipelines read from configuration.
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// A stored product older than this is re-fetched on search.
    pub product_stale_after_secs: u64,
    pub refresh_batch_size: i64,
    pub inter_request_delay_ms: u64,
    /// Base URL for links in notifications.
    pub public_url: String,
}

impl TrackerSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            product_stale_after_secs: config.product_stale_after_secs,
            refresh_batch_size: config.refresh_batch_size,
            inter_request_delay_ms: config.refresh_inter_request_delay_ms,
            public_url: config.public_url.trim_end_matches('/').to_owned(),
        }
    }
}

/// Everything the pipelines need, shared by the server and the CLI.
pub struct TrackerContext {
    pub pool: PgPool,
    pub marketplaces: MarketplaceClients,
    pub notifier: Notifier,
    /// Client used to expand short links.
    pub redirect_client: reqwest::Client,
    pub settings: TrackerSettings,
}

impl TrackerContext {
    /// # Errors
    ///
    /// Returns [`TrackerError`] if an HTTP client cannot be built or
    /// configured notification credentials are invalid.
    pub fn from_app_config(pool: PgPool, config: &AppConfig) -> Result<Self, TrackerError> {
        Ok(Self {
            pool,
            marketplaces: MarketplaceClients::from_app_config(config)?,
            notifier: Notifier::from_app_config(config)?,
            redirect_client: redirect_client(config.http_timeout_secs, &config.http_user_agent)?,
            settings: TrackerSettings::from_app_config(config),
        })
    }
}

/// Writes an `activity_logs` row. Failures are logged and swallowed so that
/// bookkeeping never fails the operation being recorded.
pub async fn record_activity(
    pool: &PgPool,
    level: LogLevel,
    category: &str,
    message: &str,
    user_id: Option<i64>,
    context: serde_json::Value,
) {
    let entry = NewActivityLog {
        level,
        category,
        message,
        user_id,
        context,
    };
    if let Err(e) = amezprice_db::insert_activity_log(pool, &entry).await {
        tracing::warn!(category, error = %e, "failed to write activity log");
    }
}
