//! Flipkart Affiliate API client.

pub mod types;

use amezprice_core::{FlipkartCredentials, Marketplace, MarketplaceProduct};
use reqwest::{Client, StatusCode, Url};

use crate::error::MarketplaceError;
use crate::retry::{retry_after_secs, retry_with_backoff};
use crate::HttpOptions;
use types::ProductResponse;

const DEFAULT_BASE_URL: &str = "https://affiliate-api.flipkart.net/";
const PRODUCT_PATH: &str = "affiliate/1.0/product.json";

pub struct FlipkartClient {
    client: Client,
    credentials: FlipkartCredentials,
    base_url: Url,
    options: HttpOptions,
}

impl FlipkartClient {
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Http`] if the `reqwest::Client` cannot be
    /// built.
    pub fn new(
        credentials: FlipkartCredentials,
        options: HttpOptions,
    ) -> Result<Self, MarketplaceError> {
        Self::with_base_url(credentials, options, DEFAULT_BASE_URL)
    }

    /// Points the client at `base_url` instead of the production API.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`MarketplaceError::InvalidUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        credentials: FlipkartCredentials,
        options: HttpOptions,
        base_url: &str,
    ) -> Result<Self, MarketplaceError> {
        let client = options.build_client()?;
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| MarketplaceError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
            base_url,
            options,
        })
    }

    #[must_use]
    pub fn affiliate_id(&self) -> &str {
        &self.credentials.affiliate_id
    }

    /// Fetches one product by PID.
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::NotFound`] on HTTP 404 or an empty body.
    /// - [`MarketplaceError::RateLimited`] after retries on HTTP 429.
    /// - [`MarketplaceError::UnexpectedStatus`] for other non-2xx responses.
    /// - [`MarketplaceError::Deserialize`] if the body has an unexpected shape.
    pub async fn get_product(&self, pid: &str) -> Result<MarketplaceProduct, MarketplaceError> {
        let mut url = self
            .base_url
            .join(PRODUCT_PATH)
            .map_err(|e| MarketplaceError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        url.query_pairs_mut().append_pair("id", pid);

        let body = retry_with_backoff(
            self.options.max_retries,
            self.options.backoff_base_secs,
            || self.fetch(&url, pid),
        )
        .await?;

        let parsed: ProductResponse =
            serde_json::from_str(&body).map_err(|e| MarketplaceError::Deserialize {
                context: format!("flipkart product.json(id={pid})"),
                source: e,
            })?;

        Ok(parsed.product_base_info_v1.into_product())
    }

    async fn fetch(&self, url: &Url, pid: &str) -> Result<String, MarketplaceError> {
        let response = self
            .client
            .get(url.clone())
            .header("Fk-Affiliate-Id", &self.credentials.affiliate_id)
            .header("Fk-Affiliate-Token", &self.credentials.affiliate_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
            return Err(MarketplaceError::NotFound {
                marketplace: Marketplace::Flipkart,
                id: pid.to_owned(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketplaceError::RateLimited {
                service: "flipkart",
                retry_after_secs: retry_after_secs(&response),
            });
        }
        if !status.is_success() {
            return Err(MarketplaceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Err(MarketplaceError::NotFound {
                marketplace: Marketplace::Flipkart,
                id: pid.to_owned(),
            });
        }
        Ok(body)
    }
}
