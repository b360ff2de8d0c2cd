//! Pure price-change rules used by the refresh pipeline to decide which
//! observations are worth an alert.

use rust_decimal::Decimal;
use serde::Serialize;

/// Price and availability of a product at one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceState {
    pub price: Option<Decimal>,
    pub in_stock: bool,
}

/// An observed change that tracking users may want to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriceEvent {
    PriceDrop { old: Decimal, new: Decimal },
    BackInStock { price: Option<Decimal> },
}

impl PriceEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceEvent::PriceDrop { .. } => "price_drop",
            PriceEvent::BackInStock { .. } => "back_in_stock",
        }
    }
}

/// A user's alert settings for one tracked product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPreference {
    pub email: bool,
    pub push: bool,
    /// Only alert on drops that land at or below this price.
    pub threshold: Option<Decimal>,
}

/// Compare two observations of the same product.
///
/// Restocks take precedence over price movement. Price rises and items going
/// out of stock are not events.
#[must_use]
pub fn detect_price_event(previous: PriceState, current: PriceState) -> Option<PriceEvent> {
    if !previous.in_stock && current.in_stock {
        return Some(PriceEvent::BackInStock {
            price: current.price,
        });
    }

    if !previous.in_stock || !current.in_stock {
        return None;
    }

    match (previous.price, current.price) {
        (Some(old), Some(new)) if new < old => Some(PriceEvent::PriceDrop { old, new }),
        _ => None,
    }
}

/// Whether `event` should be delivered to a user with `pref`.
#[must_use]
pub fn should_alert(pref: &AlertPreference, event: &PriceEvent) -> bool {
    if !pref.email && !pref.push {
        return false;
    }

    match event {
        PriceEvent::PriceDrop { new, .. } => pref.threshold.is_none_or(|limit| *new <= limit),
        PriceEvent::BackInStock { .. } => true,
    }
}

/// Percentage saved going from `old` to `new`, rounded to two places.
///
/// Returns `None` when `old` is not positive.
#[must_use]
pub fn discount_percent(old: Decimal, new: Decimal) -> Option<Decimal> {
    if old <= Decimal::ZERO {
        return None;
    }
    Some(((old - new) / old * Decimal::ONE_HUNDRED).round_dp(2))
}
