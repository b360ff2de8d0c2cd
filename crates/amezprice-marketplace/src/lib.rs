//! Marketplace integrations: URL classification and short-link resolution,
//! the Amazon PA-API 5 client, and the Flipkart Affiliate API client.

pub mod amazon;
pub mod error;
pub mod flipkart;
pub mod retry;
pub mod url;

use std::time::Duration;

use amezprice_core::{AppConfig, Marketplace, MarketplaceProduct};
use reqwest::Client;

pub use amazon::{AmazonClient, MAX_ITEMS_PER_REQUEST};
pub use error::MarketplaceError;
pub use flipkart::FlipkartClient;
pub use retry::retry_with_backoff;
pub use url::{
    affiliate_url, classify_url, extract_asin, extract_identifier, extract_pid, redirect_client,
    resolve_redirects, ClassifiedUrl,
};

/// Transport settings shared by the marketplace clients.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_retries: u32,
    pub backoff_base_secs: u64,
}

impl HttpOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.http_timeout_secs,
            user_agent: config.http_user_agent.clone(),
            max_retries: config.http_max_retries,
            backoff_base_secs: config.http_retry_backoff_base_secs,
        }
    }

    pub(crate) fn build_client(&self) -> Result<Client, MarketplaceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(&self.user_agent)
            .build()?;
        Ok(client)
    }
}

/// The configured marketplace clients. A marketplace without credentials
/// has no client and every lookup against it fails with
/// [`MarketplaceError::NotConfigured`].
#[derive(Default)]
pub struct MarketplaceClients {
    pub amazon: Option<AmazonClient>,
    pub flipkart: Option<FlipkartClient>,
}

impl MarketplaceClients {
    /// Builds a client for every marketplace with credentials in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Http`] if a `reqwest::Client` cannot be
    /// built.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, MarketplaceError> {
        let options = HttpOptions::from_app_config(config);
        let amazon = config
            .amazon
            .clone()
            .map(|creds| AmazonClient::new(creds, options.clone()))
            .transpose()?;
        let flipkart = config
            .flipkart
            .clone()
            .map(|creds| FlipkartClient::new(creds, options.clone()))
            .transpose()?;
        if amazon.is_none() {
            tracing::warn!("Amazon PA-API credentials not configured; Amazon lookups disabled");
        }
        if flipkart.is_none() {
            tracing::warn!("Flipkart affiliate credentials not configured; Flipkart lookups disabled");
        }
        Ok(Self { amazon, flipkart })
    }

    /// The affiliate tag to append to product links, if the marketplace is
    /// configured.
    #[must_use]
    pub fn affiliate_tag(&self, marketplace: Marketplace) -> Option<&str> {
        match marketplace {
            Marketplace::Amazon => self.amazon.as_ref().map(AmazonClient::associate_tag),
            Marketplace::Flipkart => self.flipkart.as_ref().map(FlipkartClient::affiliate_id),
        }
    }

    /// Fetches one product from its marketplace.
    ///
    /// # Errors
    ///
    /// [`MarketplaceError::NotConfigured`] when the marketplace has no
    /// client, otherwise whatever the marketplace client returns.
    pub async fn fetch_product(
        &self,
        marketplace: Marketplace,
        id: &str,
    ) -> Result<MarketplaceProduct, MarketplaceError> {
        match marketplace {
            Marketplace::Amazon => {
                let client = self
                    .amazon
                    .as_ref()
                    .ok_or(MarketplaceError::NotConfigured(marketplace))?;
                client.get_item(id).await
            }
            Marketplace::Flipkart => {
                let client = self
                    .flipkart
                    .as_ref()
                    .ok_or(MarketplaceError::NotConfigured(marketplace))?;
                client.get_product(id).await
            }
        }
    }
}
