//! Amazon Product Advertising API 5.0 client (`GetItems`).

pub mod sigv4;
pub mod types;

use amezprice_core::{AmazonCredentials, Marketplace, MarketplaceProduct};
use chrono::Utc;
use reqwest::{Client, StatusCode, Url};

use crate::error::MarketplaceError;
use crate::retry::{retry_after_secs, retry_with_backoff};
use crate::HttpOptions;
use sigv4::{CanonicalRequest, SigningScope};
use types::{GetItemsRequest, GetItemsResponse};

/// PA-API rejects `GetItems` calls with more ids than this.
pub const MAX_ITEMS_PER_REQUEST: usize = 10;

const SERVICE: &str = "ProductAdvertisingAPI";
const GET_ITEMS_PATH: &str = "/paapi5/getitems";
const GET_ITEMS_TARGET: &str = "com.amazon.paapi5.v1.ProductAdvertisingAPIv1.GetItems";
const CONTENT_TYPE: &str = "application/json; charset=utf-8";
const CONTENT_ENCODING: &str = "amz-1.0";

const RESOURCES: &[&str] = &[
    "ItemInfo.Title",
    "Images.Primary.Large",
    "BrowseNodeInfo.BrowseNodes",
    "Offers.Listings.Price",
    "Offers.Listings.SavingBasis",
    "Offers.Listings.Availability.Type",
    "Offers.Listings.Availability.Message",
    "CustomerReviews.StarRating",
    "CustomerReviews.Count",
];

/// Error codes PA-API uses for ids it will not return.
const ITEM_MISSING_CODES: &[&str] = &["InvalidParameterValue", "ItemNotAccessible"];

pub struct AmazonClient {
    client: Client,
    credentials: AmazonCredentials,
    endpoint: Url,
    options: HttpOptions,
}

impl AmazonClient {
    /// Creates a client for the host named in `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::Http`] if the `reqwest::Client` cannot be
    /// built, or [`MarketplaceError::InvalidUrl`] for a malformed host.
    pub fn new(
        credentials: AmazonCredentials,
        options: HttpOptions,
    ) -> Result<Self, MarketplaceError> {
        let base = format!("https://{}", credentials.host);
        Self::with_base_url(credentials, options, &base)
    }

    /// Creates a client that sends requests to `base_url` (wiremock in tests).
    /// Requests are still signed for `credentials.host`.
    ///
    /// # Errors
    ///
    /// See [`AmazonClient::new`].
    pub fn with_base_url(
        credentials: AmazonCredentials,
        options: HttpOptions,
        base_url: &str,
    ) -> Result<Self, MarketplaceError> {
        let client = options.build_client()?;
        let endpoint = Url::parse(&format!(
            "{}{GET_ITEMS_PATH}",
            base_url.trim_end_matches('/')
        ))
        .map_err(|e| MarketplaceError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            credentials,
            endpoint,
            options,
        })
    }

    #[must_use]
    pub fn associate_tag(&self) -> &str {
        &self.credentials.associate_tag
    }

    /// Looks up a single ASIN.
    ///
    /// # Errors
    ///
    /// Returns [`MarketplaceError::NotFound`] when Amazon does not return the
    /// item, plus anything [`AmazonClient::get_items`] can return.
    pub async fn get_item(&self, asin: &str) -> Result<MarketplaceProduct, MarketplaceError> {
        let not_found = || MarketplaceError::NotFound {
            marketplace: Marketplace::Amazon,
            id: asin.to_owned(),
        };

        let products = match self.get_items(&[asin.to_owned()]).await {
            Ok(products) => products,
            Err(MarketplaceError::Api { code, .. })
                if ITEM_MISSING_CODES.contains(&code.as_str()) =>
            {
                return Err(not_found());
            }
            Err(e) => return Err(e),
        };

        products
            .into_iter()
            .find(|p| p.source_product_id.eq_ignore_ascii_case(asin))
            .ok_or_else(not_found)
    }

    /// Fetches up to [`MAX_ITEMS_PER_REQUEST`] ASINs in one call.
    ///
    /// Items Amazon reports an error for are logged and left out. Transient
    /// failures are retried per [`HttpOptions`].
    ///
    /// # Errors
    ///
    /// - [`MarketplaceError::TooManyItems`] for more than ten ids.
    /// - [`MarketplaceError::Api`] when the response carries only errors.
    /// - [`MarketplaceError::RateLimited`] after retries on HTTP 429.
    /// - [`MarketplaceError::Http`] / [`MarketplaceError::UnexpectedStatus`]
    ///   for transport failures.
    pub async fn get_items(
        &self,
        asins: &[String],
    ) -> Result<Vec<MarketplaceProduct>, MarketplaceError> {
        if asins.is_empty() {
            return Ok(Vec::new());
        }
        if asins.len() > MAX_ITEMS_PER_REQUEST {
            return Err(MarketplaceError::TooManyItems {
                max: MAX_ITEMS_PER_REQUEST,
                count: asins.len(),
            });
        }

        let request = GetItemsRequest {
            item_ids: asins,
            partner_tag: &self.credentials.associate_tag,
            partner_type: "Associates",
            marketplace: &self.credentials.marketplace,
            resources: RESOURCES,
        };
        let payload =
            serde_json::to_vec(&request).map_err(|e| MarketplaceError::Deserialize {
                context: "GetItems request".to_owned(),
                source: e,
            })?;

        let response = retry_with_backoff(
            self.options.max_retries,
            self.options.backoff_base_secs,
            || self.send_get_items(&payload),
        )
        .await?;

        for err in &response.errors {
            tracing::warn!(code = %err.code, message = %err.message, "PA-API item error");
        }

        let items = response.items_result.map(|r| r.items).unwrap_or_default();
        if items.is_empty() {
            if let Some(first) = response.errors.into_iter().next() {
                return Err(MarketplaceError::Api {
                    marketplace: Marketplace::Amazon,
                    code: first.code,
                    message: first.message,
                });
            }
        }

        Ok(items.into_iter().map(types::Item::into_product).collect())
    }

    async fn send_get_items(&self, payload: &[u8]) -> Result<GetItemsResponse, MarketplaceError> {
        let now = Utc::now();
        let amz_date = sigv4::amz_date(now);
        let headers = [
            ("content-encoding", CONTENT_ENCODING),
            ("content-type", CONTENT_TYPE),
            ("host", self.credentials.host.as_str()),
            ("x-amz-date", amz_date.as_str()),
            ("x-amz-target", GET_ITEMS_TARGET),
        ];
        let scope = SigningScope {
            access_key: &self.credentials.access_key,
            secret_key: &self.credentials.secret_key,
            region: &self.credentials.region,
            service: SERVICE,
        };
        let authorization = sigv4::authorization_header(
            &scope,
            &CanonicalRequest {
                method: "POST",
                path: GET_ITEMS_PATH,
                query: "",
                headers: &headers,
                payload,
            },
            now,
        )?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("content-encoding", CONTENT_ENCODING)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-date", &amz_date)
            .header("x-amz-target", GET_ITEMS_TARGET)
            .header("authorization", authorization)
            .body(payload.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketplaceError::RateLimited {
                service: "amazon",
                retry_after_secs: retry_after_secs(&response),
            });
        }
        if status.is_server_error() {
            return Err(MarketplaceError::UnexpectedStatus {
                status: status.as_u16(),
                url: self.endpoint.to_string(),
            });
        }

        let body = response.text().await?;
        let parsed: GetItemsResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(MarketplaceError::UnexpectedStatus {
                    status: status.as_u16(),
                    url: self.endpoint.to_string(),
                });
            }
            Err(e) => {
                return Err(MarketplaceError::Deserialize {
                    context: "GetItems response".to_owned(),
                    source: e,
                });
            }
        };

        // 4xx bodies carry the reason (bad signature, unknown partner tag).
        if !status.is_success() {
            let (code, message) = match parsed.errors.into_iter().next() {
                Some(e) => (e.code, e.message),
                None => (status.as_u16().to_string(), String::new()),
            };
            return Err(MarketplaceError::Api {
                marketplace: Marketplace::Amazon,
                code,
                message,
            });
        }

        Ok(parsed)
    }
}
