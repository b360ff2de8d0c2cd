//! Search/ingestion: turn a pasted marketplace URL into a stored, tracked
//! product.

use amezprice_core::{Marketplace, MarketplaceProduct};
use amezprice_db::{LogLevel, ProductRow, TrackingRow, UpsertProduct};
use amezprice_marketplace::{
    affiliate_url, classify_url, extract_identifier, resolve_redirects, MarketplaceError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::{record_activity, TrackerContext, TrackerError};

/// Where the returned product data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSource {
    /// Stored row, recently checked.
    Cached,
    /// Fetched from the marketplace API just now.
    Fetched,
    /// Stored row served because the marketplace could not be queried.
    Stale,
}

impl ProductSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProductSource::Cached => "cached",
            ProductSource::Fetched => "fetched",
            ProductSource::Stale => "stale",
        }
    }
}

/// Marketplace and identifier a URL resolved to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProduct {
    pub marketplace: Marketplace,
    pub source_product_id: String,
    /// The URL the identifier was extracted from (after redirects).
    pub resolved_url: String,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub resolved: ResolvedProduct,
    pub product: ProductRow,
    pub source: ProductSource,
    /// Present when the search was made by a signed-in user.
    pub tracking: Option<TrackingRow>,
}

/// Result of a read-only lookup.
#[derive(Debug)]
pub struct ProductLookup {
    pub resolved: ResolvedProduct,
    pub stored: Option<ProductRow>,
    /// `None` when the marketplace is not configured.
    pub fetched: Option<MarketplaceProduct>,
}

/// Validates `raw_url`, expands short links and extracts the ASIN/PID.
///
/// # Errors
///
/// - [`TrackerError::Marketplace`] for invalid/unsupported URLs, redirect
///   failures and URLs without an identifier.
/// - [`TrackerError::MarketplaceMismatch`] when a short link lands on the
///   other marketplace.
pub async fn resolve_product_url(
    ctx: &TrackerContext,
    raw_url: &str,
) -> Result<ResolvedProduct, TrackerError> {
    let classified = classify_url(raw_url)?;

    let (marketplace, url) = if classified.is_short_link {
        let final_url = resolve_redirects(&ctx.redirect_client, &classified.url).await?;
        let landed = classify_url(final_url.as_str())?;
        if landed.marketplace != classified.marketplace {
            return Err(TrackerError::MarketplaceMismatch {
                expected: classified.marketplace,
                actual: landed.marketplace,
            });
        }
        (landed.marketplace, landed.url)
    } else {
        (classified.marketplace, classified.url)
    };

    let source_product_id = extract_identifier(marketplace, &url)?;
    Ok(ResolvedProduct {
        marketplace,
        source_product_id,
        resolved_url: url.to_string(),
    })
}

fn is_fresh(row: &ProductRow, stale_after_secs: u64, now: DateTime<Utc>) -> bool {
    let Some(checked) = row.last_checked_at else {
        return false;
    };
    let age = now.signed_duration_since(checked).num_seconds();
    age >= 0 && u64::try_from(age).is_ok_and(|age| age < stale_after_secs)
}

/// Resolves and fetches a product without writing anything.
///
/// # Errors
///
/// See [`resolve_product_url`]; marketplace API failures other than a
/// missing configuration are returned as [`TrackerError::Marketplace`].
pub async fn lookup_product(
    ctx: &TrackerContext,
    raw_url: &str,
) -> Result<ProductLookup, TrackerError> {
    let resolved = resolve_product_url(ctx, raw_url).await?;
    let stored = amezprice_db::get_product_by_source(
        &ctx.pool,
        resolved.marketplace,
        &resolved.source_product_id,
    )
    .await?;

    let fetched = match ctx
        .marketplaces
        .fetch_product(resolved.marketplace, &resolved.source_product_id)
        .await
    {
        Ok(product) => Some(product),
        Err(MarketplaceError::NotConfigured(_)) => None,
        Err(e) => return Err(e.into()),
    };

    Ok(ProductLookup {
        resolved,
        stored,
        fetched,
    })
}

/// Resolves `raw_url` to a stored product, refreshing it from the
/// marketplace when the stored copy is missing or stale, and starts tracking
/// it for `user_id`.
///
/// # Errors
///
/// - Anything [`resolve_product_url`] returns.
/// - [`TrackerError::MarketplaceUnavailable`] when the marketplace is not
///   configured and the product was never stored.
/// - [`TrackerError::Marketplace`] when the marketplace API fails and there
///   is no stored copy to fall back on, or reports the product missing.
/// - [`TrackerError::Db`] on database failures.
pub async fn search_product(
    ctx: &TrackerContext,
    raw_url: &str,
    user_id: Option<i64>,
) -> Result<SearchOutcome, TrackerError> {
    let resolved = resolve_product_url(ctx, raw_url).await?;
    let marketplace = resolved.marketplace;
    let id = resolved.source_product_id.as_str();

    let stored = amezprice_db::get_product_by_source(&ctx.pool, marketplace, id).await?;

    let (product, source) = match stored {
        Some(row) if is_fresh(&row, ctx.settings.product_stale_after_secs, Utc::now()) => {
            (row, ProductSource::Cached)
        }
        stored => match ctx.marketplaces.fetch_product(marketplace, id).await {
            Ok(observed) => (store_observation(ctx, &observed).await?, ProductSource::Fetched),
            Err(MarketplaceError::NotConfigured(_)) => match stored {
                Some(row) => {
                    tracing::warn!(
                        %marketplace,
                        id,
                        "marketplace not configured, serving stored product"
                    );
                    (row, ProductSource::Stale)
                }
                None => return Err(TrackerError::MarketplaceUnavailable(marketplace)),
            },
            Err(e @ MarketplaceError::NotFound { .. }) => return Err(e.into()),
            Err(e) => match stored {
                Some(row) => {
                    tracing::warn!(
                        %marketplace,
                        id,
                        error = %e,
                        "marketplace lookup failed, serving stored product"
                    );
                    (row, ProductSource::Stale)
                }
                None => return Err(e.into()),
            },
        },
    };

    let tracking = match user_id {
        Some(user_id) => {
            let has_push = !amezprice_db::list_push_subscriptions_for_user(&ctx.pool, user_id)
                .await?
                .is_empty();
            Some(amezprice_db::track_product(&ctx.pool, user_id, product.id, true, has_push).await?)
        }
        None => None,
    };

    tracing::info!(
        %marketplace,
        id,
        product_id = product.id,
        source = source.as_str(),
        tracked = tracking.is_some(),
        "product search"
    );
    record_activity(
        &ctx.pool,
        LogLevel::Info,
        "search",
        &format!("searched {marketplace} product {id}"),
        user_id,
        json!({
            "product_id": product.id,
            "source": source.as_str(),
            "url": resolved.resolved_url,
        }),
    )
    .await;

    Ok(SearchOutcome {
        resolved,
        product,
        source,
        tracking,
    })
}

/// Upserts a fresh observation and records today's price point.
///
/// # Errors
///
/// Returns [`TrackerError::Db`] on database failures, or
/// [`TrackerError::Marketplace`] if the affiliate link cannot be built.
pub async fn store_observation(
    ctx: &TrackerContext,
    observed: &MarketplaceProduct,
) -> Result<ProductRow, TrackerError> {
    let link = affiliate_url(
        observed.marketplace,
        &observed.source_product_id,
        ctx.marketplaces.affiliate_tag(observed.marketplace),
    )?;
    let row = amezprice_db::upsert_product(
        &ctx.pool,
        UpsertProduct {
            product: observed,
            affiliate_url: &link,
        },
    )
    .await?;

    if let Some(price) = observed.price {
        amezprice_db::record_price_point(&ctx.pool, row.id, price, observed.in_stock).await?;
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn row(last_checked_at: Option<DateTime<Utc>>) -> ProductRow {
        let now = Utc::now();
        ProductRow {
            id: 1,
            marketplace: "amazon".to_owned(),
            source_product_id: "B0CHX1W1XY".to_owned(),
            name: "Kettle".to_owned(),
            detail_url: None,
            affiliate_url: "https://www.amazon.in/dp/B0CHX1W1XY".to_owned(),
            image_url: None,
            category: None,
            currency_code: "INR".to_owned(),
            current_price: None,
            mrp: None,
            highest_price: None,
            lowest_price: None,
            stock_status: "in_stock".to_owned(),
            rating: None,
            rating_count: None,
            last_checked_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn freshness_uses_last_checked_at() {
        let now = Utc::now();
        assert!(is_fresh(&row(Some(now - Duration::seconds(60))), 3600, now));
        assert!(!is_fresh(&row(Some(now - Duration::seconds(7200))), 3600, now));
        assert!(!is_fresh(&row(None), 3600, now));
    }

    #[test]
    fn future_timestamps_are_not_fresh() {
        let now = Utc::now();
        assert!(!is_fresh(&row(Some(now + Duration::seconds(60))), 3600, now));
    }

    #[test]
    fn source_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(ProductSource::Stale).unwrap(),
            serde_json::json!("stale")
        );
    }
}
