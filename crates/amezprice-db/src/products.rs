//! Database operations for the `products` table.

use amezprice_core::{Marketplace, MarketplaceProduct, PriceState, StockStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::DbError;

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub marketplace: String,
    pub source_product_id: String,
    pub name: String,
    pub detail_url: Option<String>,
    pub affiliate_url: String,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub currency_code: String,
    pub current_price: Option<Decimal>,
    pub mrp: Option<Decimal>,
    /// Highest price ever observed. `NULL` until the first priced observation.
    pub highest_price: Option<Decimal>,
    pub lowest_price: Option<Decimal>,
    pub stock_status: String,
    pub rating: Option<Decimal>,
    pub rating_count: Option<i32>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductRow {
    /// # Errors
    ///
    /// Returns [`DbError::InvalidValue`] if the stored marketplace is unknown.
    pub fn marketplace(&self) -> Result<Marketplace, DbError> {
        Ok(self.marketplace.parse::<Marketplace>()?)
    }

    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.stock_status == StockStatus::InStock.as_str()
    }

    #[must_use]
    pub fn price_state(&self) -> PriceState {
        PriceState {
            price: self.current_price,
            in_stock: self.in_stock(),
        }
    }
}

/// Filters for the public product listing.
#[derive(Debug, Clone, Default)]
pub struct ProductListFilters<'a> {
    pub marketplace: Option<Marketplace>,
    /// Case-insensitive substring match on the product name.
    pub search: Option<&'a str>,
    pub limit: i64,
    pub offset: i64,
}

/// Inputs for [`upsert_product`].
#[derive(Debug, Clone, Copy)]
pub struct UpsertProduct<'a> {
    pub product: &'a MarketplaceProduct,
    pub affiliate_url: &'a str,
}

/// Inserts or updates a product from a fresh marketplace observation in a
/// single statement, and stamps `last_checked_at`.
///
/// Conflicts on `(marketplace, source_product_id)`. Descriptive fields are
/// replaced; `highest_price`/`lowest_price` fold in the new price with
/// `GREATEST`/`LEAST` (which ignore `NULL`). A missing price keeps the last
/// known one so the product page still has something to show while out of
/// stock.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_product(pool: &PgPool, input: UpsertProduct<'_>) -> Result<ProductRow, DbError> {
    let p = input.product;

    let row = sqlx::query_as::<_, ProductRow>(
        "INSERT INTO products \
             (marketplace, source_product_id, name, detail_url, affiliate_url, image_url, \
              category, currency_code, current_price, mrp, highest_price, lowest_price, \
              stock_status, rating, rating_count, last_checked_at) \
         VALUES ($1, $2, $3, $4, $5, $6, \
                 $7, $8, $9, $10, $9, $9, \
                 $11, $12, $13, NOW()) \
         ON CONFLICT (marketplace, source_product_id) DO UPDATE SET \
             name            = EXCLUDED.name, \
             detail_url      = COALESCE(EXCLUDED.detail_url, products.detail_url), \
             affiliate_url   = EXCLUDED.affiliate_url, \
             image_url       = COALESCE(EXCLUDED.image_url, products.image_url), \
             category        = COALESCE(EXCLUDED.category, products.category), \
             currency_code   = EXCLUDED.currency_code, \
             current_price   = COALESCE(EXCLUDED.current_price, products.current_price), \
             mrp             = COALESCE(EXCLUDED.mrp, products.mrp), \
             highest_price   = GREATEST(products.highest_price, EXCLUDED.current_price), \
             lowest_price    = LEAST(products.lowest_price, EXCLUDED.current_price), \
             stock_status    = EXCLUDED.stock_status, \
             rating          = COALESCE(EXCLUDED.rating, products.rating), \
             rating_count    = COALESCE(EXCLUDED.rating_count, products.rating_count), \
             last_checked_at = NOW(), \
             updated_at      = NOW() \
         RETURNING id, marketplace, source_product_id, name, detail_url, affiliate_url, \
                   image_url, category, currency_code, current_price, mrp, highest_price, \
                   lowest_price, stock_status, rating, rating_count, last_checked_at, \
                   created_at, updated_at",
    )
    .bind(p.marketplace.as_str())
    .bind(&p.source_product_id)
    .bind(&p.name)
    .bind(&p.detail_url)
    .bind(input.affiliate_url)
    .bind(&p.image_url)
    .bind(&p.category)
    .bind(&p.currency_code)
    .bind(p.price)
    .bind(p.mrp)
    .bind(p.stock_status().as_str())
    .bind(p.rating)
    .bind(p.rating_count)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetches a product by internal id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists, or [`DbError::Sqlx`] if
/// the query fails.
pub async fn get_product(pool: &PgPool, id: i64) -> Result<ProductRow, DbError> {
    sqlx::query_as::<_, ProductRow>(
        "SELECT id, marketplace, source_product_id, name, detail_url, affiliate_url, \
                image_url, category, currency_code, current_price, mrp, highest_price, \
                lowest_price, stock_status, rating, rating_count, last_checked_at, \
                created_at, updated_at \
         FROM products \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Looks a product up by marketplace and ASIN/PID.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_product_by_source(
    pool: &PgPool,
    marketplace: Marketplace,
    source_product_id: &str,
) -> Result<Option<ProductRow>, DbError> {
    let row = sqlx::query_as::<_, ProductRow>(
        "SELECT id, marketplace, source_product_id, name, detail_url, affiliate_url, \
                image_url, category, currency_code, current_price, mrp, highest_price, \
                lowest_price, stock_status, rating, rating_count, last_checked_at, \
                created_at, updated_at \
         FROM products \
         WHERE marketplace = $1 AND source_product_id = $2",
    )
    .bind(marketplace.as_str())
    .bind(source_product_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Stamps `last_checked_at = NOW()` without touching price fields. Used when a
/// refresh attempt found nothing new to write.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn mark_product_checked(pool: &PgPool, id: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE products SET last_checked_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Products with at least one tracker, least recently checked first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products_for_refresh(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT p.id, p.marketplace, p.source_product_id, p.name, p.detail_url, \
                p.affiliate_url, p.image_url, p.category, p.currency_code, p.current_price, \
                p.mrp, p.highest_price, p.lowest_price, p.stock_status, p.rating, \
                p.rating_count, p.last_checked_at, p.created_at, p.updated_at \
         FROM products p \
         WHERE EXISTS (SELECT 1 FROM user_products up WHERE up.product_id = p.id) \
         ORDER BY p.last_checked_at ASC NULLS FIRST, p.id ASC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Public product listing, most recently updated first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_products(
    pool: &PgPool,
    filters: &ProductListFilters<'_>,
) -> Result<Vec<ProductRow>, DbError> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, marketplace, source_product_id, name, detail_url, affiliate_url, \
                image_url, category, currency_code, current_price, mrp, highest_price, \
                lowest_price, stock_status, rating, rating_count, last_checked_at, \
                created_at, updated_at \
         FROM products \
         WHERE ($1::TEXT IS NULL OR marketplace = $1) \
           AND ($2::TEXT IS NULL OR name ILIKE '%' || $2 || '%') \
         ORDER BY updated_at DESC, id DESC \
         LIMIT $3 OFFSET $4",
    )
    .bind(filters.marketplace.map(Marketplace::as_str))
    .bind(filters.search)
    .bind(filters.limit)
    .bind(filters.offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
