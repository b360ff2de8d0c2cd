//! PA-API 5 `GetItems` request/response shapes (only the fields we read).

use amezprice_core::{Marketplace, MarketplaceProduct};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemsRequest<'a> {
    pub item_ids: &'a [String],
    pub partner_tag: &'a str,
    pub partner_type: &'a str,
    pub marketplace: &'a str,
    pub resources: &'a [&'a str],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetItemsResponse {
    #[serde(default)]
    pub items_result: Option<ItemsResult>,
    #[serde(default)]
    pub errors: Vec<ApiErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResult {
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    #[serde(rename = "ASIN")]
    pub asin: String,
    #[serde(rename = "DetailPageURL")]
    pub detail_page_url: Option<String>,
    pub item_info: Option<ItemInfo>,
    pub images: Option<Images>,
    pub browse_node_info: Option<BrowseNodeInfo>,
    pub offers: Option<Offers>,
    pub customer_reviews: Option<CustomerReviews>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemInfo {
    pub title: Option<DisplayValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DisplayValue {
    pub display_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Images {
    pub primary: Option<ImageSizes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ImageSizes {
    pub large: Option<Image>,
    pub medium: Option<Image>,
}

#[derive(Debug, Deserialize)]
pub struct Image {
    #[serde(rename = "URL")]
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrowseNodeInfo {
    #[serde(default)]
    pub browse_nodes: Vec<BrowseNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BrowseNode {
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Offers {
    #[serde(default)]
    pub listings: Vec<Listing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Listing {
    pub price: Option<Money>,
    pub saving_basis: Option<Money>,
    pub availability: Option<Availability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Money {
    pub amount: Decimal,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Availability {
    #[serde(rename = "Type")]
    pub kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomerReviews {
    pub star_rating: Option<StarRating>,
    pub count: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StarRating {
    pub value: Option<Decimal>,
}

impl Item {
    /// Normalizes the item. The first offer listing is authoritative; no
    /// listing, or an `OutOfStock` availability, means unavailable.
    #[must_use]
    pub fn into_product(self) -> MarketplaceProduct {
        let listing = self.offers.and_then(|o| o.listings.into_iter().next());

        let (price, mrp, currency, in_stock) = match listing {
            Some(listing) => {
                let in_stock = listing
                    .availability
                    .as_ref()
                    .and_then(|a| a.kind.as_deref())
                    .is_none_or(|kind| !kind.eq_ignore_ascii_case("OutOfStock"));
                let currency = listing.price.as_ref().and_then(|p| p.currency.clone());
                let in_stock = in_stock && listing.price.is_some();
                (
                    listing.price.map(|p| p.amount),
                    listing.saving_basis.map(|p| p.amount),
                    currency,
                    in_stock,
                )
            }
            None => (None, None, None, false),
        };

        let image_url = self
            .images
            .and_then(|i| i.primary)
            .and_then(|p| p.large.or(p.medium))
            .map(|img| img.url);

        let category = self
            .browse_node_info
            .and_then(|b| b.browse_nodes.into_iter().find_map(|n| n.display_name));

        let (rating, rating_count) = match self.customer_reviews {
            Some(reviews) => (reviews.star_rating.and_then(|s| s.value), reviews.count),
            None => (None, None),
        };

        let name = self
            .item_info
            .and_then(|i| i.title)
            .map(|t| t.display_value.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.asin.clone());

        MarketplaceProduct {
            marketplace: Marketplace::Amazon,
            source_product_id: self.asin.to_ascii_uppercase(),
            name,
            detail_url: self.detail_page_url,
            image_url,
            category,
            price,
            mrp,
            currency_code: currency.unwrap_or_else(|| "INR".to_owned()),
            in_stock,
            rating,
            rating_count,
        }
    }
}
