//! Flipkart Affiliate API `product.json` response shapes.

use std::collections::HashMap;

use amezprice_core::{Marketplace, MarketplaceProduct};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductResponse {
    pub product_base_info_v1: ProductBaseInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductBaseInfo {
    pub product_id: String,
    pub title: Option<String>,
    pub product_url: Option<String>,
    #[serde(default)]
    pub image_urls: HashMap<String, String>,
    pub maximum_retail_price: Option<Money>,
    pub flipkart_selling_price: Option<Money>,
    pub flipkart_special_price: Option<Money>,
    #[serde(default)]
    pub in_stock: bool,
    pub category_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: Option<String>,
}

/// `imageUrls` is keyed by `"WIDTHxHEIGHT"`; the largest area wins.
fn largest_image(images: &HashMap<String, String>) -> Option<String> {
    let area = |key: &str| -> u64 {
        key.split_once('x')
            .and_then(|(w, h)| Some(w.parse::<u64>().ok()? * h.parse::<u64>().ok()?))
            .unwrap_or(0)
    };
    images
        .iter()
        .max_by(|a, b| area(a.0).cmp(&area(b.0)).then_with(|| b.0.cmp(a.0)))
        .map(|(_, url)| url.clone())
}

impl ProductBaseInfo {
    /// Normalizes the listing. The special price, when present, is what the
    /// buyer pays.
    #[must_use]
    pub fn into_product(self) -> MarketplaceProduct {
        let image_url = largest_image(&self.image_urls);
        let selling = self.flipkart_special_price.or(self.flipkart_selling_price);
        let currency = selling
            .as_ref()
            .or(self.maximum_retail_price.as_ref())
            .and_then(|m| m.currency.clone())
            .unwrap_or_else(|| "INR".to_owned());
        let price = selling.map(|m| m.amount.round_dp(2));
        let mrp = self.maximum_retail_price.map(|m| m.amount.round_dp(2));

        let category = self
            .category_path
            .as_deref()
            .and_then(|path| path.split('>').map(str::trim).rfind(|s| !s.is_empty()))
            .map(str::to_owned);

        let name = self
            .title
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.product_id.clone());

        MarketplaceProduct {
            marketplace: Marketplace::Flipkart,
            source_product_id: self.product_id.to_ascii_uppercase(),
            name,
            detail_url: self.product_url,
            image_url,
            category,
            in_stock: self.in_stock && price.is_some(),
            price,
            mrp,
            currency_code: currency,
            rating: None,
            rating_count: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_largest_image() {
        let images = HashMap::from([
            ("200x200".to_owned(), "small".to_owned()),
            ("800x800".to_owned(), "large".to_owned()),
            ("400x400".to_owned(), "medium".to_owned()),
        ]);
        assert_eq!(largest_image(&images).as_deref(), Some("large"));
        assert!(largest_image(&HashMap::new()).is_none());
    }

    #[test]
    fn special_price_wins_and_category_is_leaf() {
        let info: ProductBaseInfo = serde_json::from_value(serde_json::json!({
            "productId": "mobgtagptb3vs24w",
            "title": " Apple iPhone 15 ",
            "maximumRetailPrice": { "amount": 79900.0, "currency": "INR" },
            "flipkartSellingPrice": { "amount": 69999.0, "currency": "INR" },
            "flipkartSpecialPrice": { "amount": 65999.0, "currency": "INR" },
            "inStock": true,
            "categoryPath": "Mobiles>Apple>iPhone 15"
        }))
        .unwrap();
        let product = info.into_product();
        assert_eq!(product.source_product_id, "MOBGTAGPTB3VS24W");
        assert_eq!(product.name, "Apple iPhone 15");
        assert_eq!(product.price, Some(Decimal::new(65999, 0)));
        assert_eq!(product.mrp, Some(Decimal::new(79900, 0)));
        assert_eq!(product.category.as_deref(), Some("iPhone 15"));
        assert!(product.in_stock);
    }

    #[test]
    fn unpriced_listing_is_out_of_stock() {
        let info: ProductBaseInfo = serde_json::from_value(serde_json::json!({
            "productId": "MOBGTAGPTB3VS24W",
            "inStock": true
        }))
        .unwrap();
        let product = info.into_product();
        assert!(product.price.is_none());
        assert!(!product.in_stock);
        assert_eq!(product.name, "MOBGTAGPTB3VS24W");
    }
}
