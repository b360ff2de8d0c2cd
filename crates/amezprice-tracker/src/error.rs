use amezprice_core::Marketplace;
use amezprice_db::DbError;
use amezprice_marketplace::MarketplaceError;
use amezprice_notify::NotifyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),

    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("{0} lookups are not configured and the product has never been stored")]
    MarketplaceUnavailable(Marketplace),

    #[error("short link for {expected} resolved to a {actual} URL")]
    MarketplaceMismatch {
        expected: Marketplace,
        actual: Marketplace,
    },

    #[error("refresh run {run_id} failed: {message}")]
    RefreshFailed { run_id: i64, message: String },
}
