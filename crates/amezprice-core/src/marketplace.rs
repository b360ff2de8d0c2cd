use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// A supported marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Marketplace {
    Amazon,
    Flipkart,
}

impl Marketplace {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Marketplace::Amazon => "amazon",
            Marketplace::Flipkart => "flipkart",
        }
    }

    /// Human-readable name used in notification copy.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Marketplace::Amazon => "Amazon",
            Marketplace::Flipkart => "Flipkart",
        }
    }
}

impl std::fmt::Display for Marketplace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marketplace {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amazon" => Ok(Marketplace::Amazon),
            "flipkart" => Ok(Marketplace::Flipkart),
            other => Err(CoreError::UnknownMarketplace(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    InStock,
    OutOfStock,
}

impl StockStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StockStatus::InStock => "in_stock",
            StockStatus::OutOfStock => "out_of_stock",
        }
    }

    #[must_use]
    pub fn from_in_stock(in_stock: bool) -> Self {
        if in_stock {
            StockStatus::InStock
        } else {
            StockStatus::OutOfStock
        }
    }

    #[must_use]
    pub fn is_in_stock(self) -> bool {
        self == StockStatus::InStock
    }
}

impl FromStr for StockStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(StockStatus::InStock),
            "out_of_stock" => Ok(StockStatus::OutOfStock),
            other => Err(CoreError::UnknownStockStatus(other.to_string())),
        }
    }
}

/// A product as reported by a marketplace API, normalized across marketplaces
/// for storage and comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketplaceProduct {
    pub marketplace: Marketplace,
    /// ASIN for Amazon, PID for Flipkart. Always uppercase.
    pub source_product_id: String,
    pub name: String,
    /// Product page URL as returned by the marketplace (may carry its own
    /// tracking parameters).
    pub detail_url: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    /// Current selling price. `None` when the listing has no offer, which
    /// marketplaces do for unavailable items.
    pub price: Option<Decimal>,
    /// List price / MRP, when the marketplace reports one.
    pub mrp: Option<Decimal>,
    /// ISO 4217 currency code (e.g., `"INR"`).
    pub currency_code: String,
    pub in_stock: bool,
    /// Average star rating out of 5.
    pub rating: Option<Decimal>,
    pub rating_count: Option<i32>,
}

impl MarketplaceProduct {
    #[must_use]
    pub fn stock_status(&self) -> StockStatus {
        StockStatus::from_in_stock(self.in_stock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_parses_case_insensitively() {
        assert_eq!(
            "Amazon".parse::<Marketplace>().unwrap(),
            Marketplace::Amazon
        );
        assert_eq!(
            " flipkart ".parse::<Marketplace>().unwrap(),
            Marketplace::Flipkart
        );
    }

    #[test]
    fn marketplace_rejects_unknown() {
        let err = "ebay".parse::<Marketplace>().unwrap_err();
        assert_eq!(err, CoreError::UnknownMarketplace("ebay".to_string()));
    }

    #[test]
    fn marketplace_serializes_lowercase() {
        let json = serde_json::to_string(&Marketplace::Flipkart).unwrap();
        assert_eq!(json, "\"flipkart\"");
    }

    #[test]
    fn stock_status_maps_from_bool() {
        assert_eq!(StockStatus::from_in_stock(true), StockStatus::InStock);
        assert_eq!(StockStatus::from_in_stock(false), StockStatus::OutOfStock);
        assert_eq!(StockStatus::OutOfStock.as_str(), "out_of_stock");
        assert_eq!(
            "in_stock".parse::<StockStatus>().unwrap(),
            StockStatus::InStock
        );
    }

    #[test]
    fn stock_status_rejects_unknown() {
        assert!("maybe".parse::<StockStatus>().is_err());
    }
}
