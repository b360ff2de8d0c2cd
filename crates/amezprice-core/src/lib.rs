pub mod app_config;
pub mod config;
pub mod marketplace;
pub mod password;
pub mod pricing;
pub mod promotions;
pub mod users;

use thiserror::Error;

pub use app_config::{
    AmazonCredentials, AppConfig, Environment, FlipkartCredentials, SmtpConfig, VapidConfig,
};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use marketplace::{Marketplace, MarketplaceProduct, StockStatus};
pub use password::{hash_password, verify_password, UNMATCHABLE_HASH};
pub use pricing::{
    detect_price_event, discount_percent, should_alert, AlertPreference, PriceEvent, PriceState,
};
pub use promotions::{PromotionAudience, PromotionChannel};
pub use users::Role;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown marketplace: {0}")]
    UnknownMarketplace(String),

    #[error("unknown stock status: {0}")]
    UnknownStockStatus(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}
