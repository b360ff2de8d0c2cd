//! Marketplace URL handling: host validation, short-link resolution, and
//! ASIN/PID extraction.

use std::sync::LazyLock;
use std::time::Duration;

use amezprice_core::Marketplace;
use regex::Regex;
use reqwest::{redirect::Policy, Client, Url};

use crate::error::MarketplaceError;

/// Longest URL accepted from user input.
pub const MAX_URL_LEN: usize = 2048;

/// Redirect hops followed when expanding a short link.
pub const MAX_REDIRECT_HOPS: usize = 10;

static ASIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)/(?:dp|gp/product|gp/aw/d|product|d)/([A-Z0-9]{10})(?:[/?#]|$)")
        .expect("valid regex")
});
static PID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{16}$").expect("valid regex"));

/// A user-supplied URL that points at a supported marketplace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedUrl {
    pub url: Url,
    pub marketplace: Marketplace,
    /// Short links carry no identifier and must be resolved first.
    pub is_short_link: bool,
}

fn marketplace_for_host(host: &str) -> Option<Marketplace> {
    match host {
        "amazon.in" | "www.amazon.in" | "m.amazon.in" | "amzn.in" | "amzn.to" => {
            Some(Marketplace::Amazon)
        }
        "flipkart.com" | "www.flipkart.com" | "dl.flipkart.com" | "fkrt.it" | "fkrt.co" => {
            Some(Marketplace::Flipkart)
        }
        _ => None,
    }
}

/// Validates `raw` and maps its host to a marketplace.
///
/// # Errors
///
/// - [`MarketplaceError::InvalidUrl`] for empty, overlong, unparseable, or
///   non-HTTP(S) input.
/// - [`MarketplaceError::UnsupportedMarketplace`] for any other host.
pub fn classify_url(raw: &str) -> Result<ClassifiedUrl, MarketplaceError> {
    let trimmed = raw.trim();
    let invalid = |reason: &str| MarketplaceError::InvalidUrl {
        url: trimmed.chars().take(120).collect(),
        reason: reason.to_owned(),
    };

    if trimmed.is_empty() {
        return Err(invalid("URL is empty"));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(invalid("URL is too long"));
    }

    let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("only http and https URLs are supported"));
    }

    let host = url
        .host_str()
        .ok_or_else(|| invalid("URL has no host"))?
        .trim_end_matches('.')
        .to_ascii_lowercase();

    let marketplace =
        marketplace_for_host(&host).ok_or_else(|| MarketplaceError::UnsupportedMarketplace {
            host: host.clone(),
        })?;

    let is_short_link = match host.as_str() {
        "amzn.in" | "amzn.to" | "fkrt.it" | "fkrt.co" => true,
        "dl.flipkart.com" => url.path().starts_with("/s/"),
        _ => false,
    };

    Ok(ClassifiedUrl {
        url,
        marketplace,
        is_short_link,
    })
}

/// Builds a client for [`resolve_redirects`] that follows at most
/// [`MAX_REDIRECT_HOPS`] redirects.
///
/// # Errors
///
/// Returns [`MarketplaceError::Http`] if the client cannot be constructed.
pub fn redirect_client(timeout_secs: u64, user_agent: &str) -> Result<Client, MarketplaceError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .redirect(Policy::limited(MAX_REDIRECT_HOPS))
        .build()?;
    Ok(client)
}

/// Follows redirects from `url` with a GET and returns where they end.
///
/// The final response status is not checked; marketplaces often answer
/// automated clients with an error page at the correct product URL.
///
/// # Errors
///
/// - [`MarketplaceError::TooManyRedirects`] when the hop limit is exceeded.
/// - [`MarketplaceError::Http`] for network failures.
pub async fn resolve_redirects(client: &Client, url: &Url) -> Result<Url, MarketplaceError> {
    let response = client.get(url.clone()).send().await.map_err(|e| {
        if e.is_redirect() {
            MarketplaceError::TooManyRedirects {
                url: url.to_string(),
            }
        } else {
            MarketplaceError::Http(e)
        }
    })?;

    let final_url = response.url().clone();
    tracing::debug!(
        from = %url,
        to = %final_url,
        status = response.status().as_u16(),
        "resolved short link"
    );
    Ok(final_url)
}

/// First ASIN found in the URL path, uppercased.
#[must_use]
pub fn extract_asin(url: &Url) -> Option<String> {
    ASIN_RE
        .captures(url.path())
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
}

/// The `pid` query parameter when it is a well-formed Flipkart PID, uppercased.
#[must_use]
pub fn extract_pid(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key.eq_ignore_ascii_case("pid"))
        .map(|(_, value)| value.trim().to_owned())
        .filter(|pid| PID_RE.is_match(pid))
        .map(|pid| pid.to_ascii_uppercase())
}

/// Extracts the marketplace's product identifier from `url`.
///
/// # Errors
///
/// Returns [`MarketplaceError::IdentifierNotFound`] if the URL carries none.
pub fn extract_identifier(marketplace: Marketplace, url: &Url) -> Result<String, MarketplaceError> {
    let id = match marketplace {
        Marketplace::Amazon => extract_asin(url),
        Marketplace::Flipkart => extract_pid(url),
    };
    id.ok_or_else(|| MarketplaceError::IdentifierNotFound {
        marketplace,
        url: url.to_string(),
    })
}

/// Canonical product link carrying the affiliate tag, when one is configured.
///
/// # Errors
///
/// Returns [`MarketplaceError::InvalidUrl`] if the id produces an invalid URL.
pub fn affiliate_url(
    marketplace: Marketplace,
    id: &str,
    tag: Option<&str>,
) -> Result<String, MarketplaceError> {
    let (base, mut params) = match marketplace {
        Marketplace::Amazon => (format!("https://www.amazon.in/dp/{id}"), Vec::new()),
        Marketplace::Flipkart => (
            "https://www.flipkart.com/product/p/itme".to_owned(),
            vec![("pid", id)],
        ),
    };

    if let Some(tag) = tag.filter(|t| !t.is_empty()) {
        let key = match marketplace {
            Marketplace::Amazon => "tag",
            Marketplace::Flipkart => "affid",
        };
        params.push((key, tag));
    }

    let url = if params.is_empty() {
        Url::parse(&base)
    } else {
        Url::parse_with_params(&base, &params)
    }
    .map_err(|e| MarketplaceError::InvalidUrl {
        url: base.clone(),
        reason: e.to_string(),
    })?;

    Ok(url.into())
}

#[cfg(test)]
#[path = "url_test.rs"]
mod tests;
