//! `search` command: resolve a marketplace URL and show the product.

use amezprice_db::ProductRow;
use amezprice_tracker::{lookup_product, search_product, TrackerContext};
use rust_decimal::Decimal;

fn fmt_price(price: Option<Decimal>) -> String {
    price.map_or_else(|| "\u{2014}".to_string(), |p| format!("\u{20b9}{p}"))
}

fn print_row(product: &ProductRow) {
    println!("  name:    {}", product.name);
    println!("  price:   {}", fmt_price(product.current_price));
    println!("  mrp:     {}", fmt_price(product.mrp));
    println!(
        "  range:   {} .. {}",
        fmt_price(product.lowest_price),
        fmt_price(product.highest_price)
    );
    println!("  stock:   {}", product.stock_status);
    println!("  link:    {}", product.affiliate_url);
}

/// Without `dry_run` the product is stored (and refreshed when stale) the
/// same way the web search does; no user tracks it.
///
/// # Errors
///
/// Returns an error when the URL is not a supported product link or the
/// product cannot be fetched and has never been stored.
pub(crate) async fn run_search(
    ctx: &TrackerContext,
    url: &str,
    dry_run: bool,
) -> anyhow::Result<()> {
    if dry_run {
        let lookup = lookup_product(ctx, url).await?;
        println!(
            "{} {} (resolved from {})",
            lookup.resolved.marketplace,
            lookup.resolved.source_product_id,
            lookup.resolved.resolved_url
        );
        match (&lookup.fetched, &lookup.stored) {
            (Some(fetched), stored) => {
                println!("  name:    {}", fetched.name);
                println!("  price:   {}", fmt_price(fetched.price));
                println!("  mrp:     {}", fmt_price(fetched.mrp));
                println!("  in stock: {}", fetched.in_stock);
                if let Some(stored) = stored {
                    println!("  stored price: {}", fmt_price(stored.current_price));
                }
            }
            (None, Some(stored)) => {
                println!("marketplace not configured; showing stored row");
                print_row(stored);
            }
            (None, None) => {
                println!("marketplace not configured and the product was never stored");
            }
        }
        println!("dry-run: nothing was written");
        return Ok(());
    }

    let outcome = search_product(ctx, url, None).await?;
    println!(
        "{} {} [{}]",
        outcome.resolved.marketplace,
        outcome.resolved.source_product_id,
        outcome.source.as_str()
    );
    print_row(&outcome.product);
    Ok(())
}
