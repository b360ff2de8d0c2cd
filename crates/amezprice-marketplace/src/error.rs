use amezprice_core::Marketplace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("rate limited by {service} (retry after {retry_after_secs}s)")]
    RateLimited {
        service: &'static str,
        retry_after_secs: u64,
    },

    #[error("product {id} not found on {marketplace}")]
    NotFound {
        marketplace: Marketplace,
        id: String,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("{marketplace} API error {code}: {message}")]
    Api {
        marketplace: Marketplace,
        code: String,
        message: String,
    },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported marketplace host \"{host}\"")]
    UnsupportedMarketplace { host: String },

    #[error("no {marketplace} product identifier found in \"{url}\"")]
    IdentifierNotFound {
        marketplace: Marketplace,
        url: String,
    },

    #[error("too many redirects resolving \"{url}\"")]
    TooManyRedirects { url: String },

    #[error("request signing failed: {0}")]
    Signing(String),

    #[error("{0} API credentials are not configured")]
    NotConfigured(Marketplace),

    #[error("at most {max} items per request, got {count}")]
    TooManyItems { max: usize, count: usize },
}
