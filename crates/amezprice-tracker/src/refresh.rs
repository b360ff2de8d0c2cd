//! Scheduled price refresh over every tracked product.

use std::collections::HashMap;
use std::time::Duration;

use amezprice_core::{detect_price_event, Marketplace, MarketplaceProduct, PriceState};
use amezprice_db::{LogLevel, ProductRow, RefreshCounters};
use amezprice_marketplace::{MarketplaceError, MAX_ITEMS_PER_REQUEST};
use serde::Serialize;
use serde_json::json;

use crate::alerts::dispatch_price_event;
use crate::ingest::store_observation;
use crate::{record_activity, TrackerContext, TrackerError};

/// What started a refresh run. Stored in `refresh_runs.trigger_source`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshTrigger {
    Scheduler,
    Cli,
    Admin,
}

impl RefreshTrigger {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshTrigger::Scheduler => "scheduler",
            RefreshTrigger::Cli => "cli",
            RefreshTrigger::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    pub trigger: RefreshTrigger,
    /// Fetch and compare only: no writes, no alerts, no run row.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// `None` for dry runs.
    pub run_id: Option<i64>,
    pub counters: RefreshCounters,
}

/// Per-run tallies, converted to the `i32` columns at the end.
#[derive(Debug, Default)]
struct Tally {
    checked: u32,
    failed: u32,
    price_changes: u32,
    alerts_sent: u32,
}

impl Tally {
    fn counters(&self) -> RefreshCounters {
        let clamp = |n: u32| i32::try_from(n).unwrap_or(i32::MAX);
        RefreshCounters {
            products_checked: clamp(self.checked),
            products_failed: clamp(self.failed),
            price_changes: clamp(self.price_changes),
            alerts_sent: clamp(self.alerts_sent),
        }
    }
}

/// Creates a run row for `options.trigger` and executes it. Dry runs skip
/// the row.
///
/// # Errors
///
/// See [`execute_refresh_run`].
pub async fn refresh_prices(
    ctx: &TrackerContext,
    options: RefreshOptions,
) -> Result<RefreshSummary, TrackerError> {
    if options.dry_run {
        let tally = run_batch(ctx, true).await?;
        return Ok(RefreshSummary {
            run_id: None,
            counters: tally.counters(),
        });
    }

    let run = amezprice_db::create_refresh_run(&ctx.pool, options.trigger.as_str()).await?;
    execute_refresh_run(ctx, run.id).await
}

async fn fail_run_best_effort(ctx: &TrackerContext, run_id: i64, message: &str) {
    if let Err(e) = amezprice_db::fail_refresh_run(&ctx.pool, run_id, message).await {
        tracing::error!(run_id, error = %e, "failed to mark refresh run as failed");
    }
    record_activity(
        &ctx.pool,
        LogLevel::Error,
        "refresh",
        &format!("refresh run {run_id} failed"),
        None,
        json!({ "run_id": run_id, "error": message }),
    )
    .await;
}

/// Runs a queued refresh run to completion (queued → running →
/// succeeded/failed).
///
/// Per-product failures are counted, not fatal. The run fails when every
/// product failed or a database error interrupts it.
///
/// # Errors
///
/// - [`TrackerError::Db`] if the run cannot be started or completed.
/// - [`TrackerError::RefreshFailed`] when every product failed.
pub async fn execute_refresh_run(
    ctx: &TrackerContext,
    run_id: i64,
) -> Result<RefreshSummary, TrackerError> {
    amezprice_db::start_refresh_run(&ctx.pool, run_id).await?;
    tracing::info!(run_id, "price refresh started");

    let tally = match run_batch(ctx, false).await {
        Ok(tally) => tally,
        Err(e) => {
            fail_run_best_effort(ctx, run_id, &e.to_string()).await;
            return Err(e);
        }
    };

    if tally.checked > 0 && tally.failed == tally.checked {
        let message = format!("all {} products failed to refresh", tally.failed);
        fail_run_best_effort(ctx, run_id, &message).await;
        return Err(TrackerError::RefreshFailed { run_id, message });
    }

    let counters = tally.counters();
    if let Err(e) = amezprice_db::complete_refresh_run(&ctx.pool, run_id, counters).await {
        fail_run_best_effort(ctx, run_id, &e.to_string()).await;
        return Err(e.into());
    }

    tracing::info!(
        run_id,
        checked = tally.checked,
        failed = tally.failed,
        price_changes = tally.price_changes,
        alerts_sent = tally.alerts_sent,
        "price refresh completed"
    );
    record_activity(
        &ctx.pool,
        if tally.failed > 0 {
            LogLevel::Warning
        } else {
            LogLevel::Info
        },
        "refresh",
        &format!("refresh run {run_id} completed"),
        None,
        json!({
            "run_id": run_id,
            "products_checked": counters.products_checked,
            "products_failed": counters.products_failed,
            "price_changes": counters.price_changes,
            "alerts_sent": counters.alerts_sent,
        }),
    )
    .await;

    Ok(RefreshSummary {
        run_id: Some(run_id),
        counters,
    })
}

fn split_by_marketplace(products: Vec<ProductRow>) -> (Vec<ProductRow>, Vec<ProductRow>) {
    let mut amazon = Vec::new();
    let mut flipkart = Vec::new();
    for product in products {
        match product.marketplace() {
            Ok(Marketplace::Amazon) => amazon.push(product),
            Ok(Marketplace::Flipkart) => flipkart.push(product),
            Err(e) => tracing::warn!(product_id = product.id, error = %e, "skipping product"),
        }
    }
    (amazon, flipkart)
}

async fn pause(ctx: &TrackerContext) {
    if ctx.settings.inter_request_delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(ctx.settings.inter_request_delay_ms)).await;
    }
}

async fn run_batch(ctx: &TrackerContext, dry_run: bool) -> Result<Tally, TrackerError> {
    let products =
        amezprice_db::list_products_for_refresh(&ctx.pool, ctx.settings.refresh_batch_size)
            .await?;
    let (amazon, flipkart) = split_by_marketplace(products);
    let mut tally = Tally::default();

    for (index, chunk) in amazon.chunks(MAX_ITEMS_PER_REQUEST).enumerate() {
        if index > 0 {
            pause(ctx).await;
        }
        let ids: Vec<String> = chunk.iter().map(|p| p.source_product_id.clone()).collect();
        let fetched = match &ctx.marketplaces.amazon {
            Some(client) => client.get_items(&ids).await,
            None => Err(MarketplaceError::NotConfigured(Marketplace::Amazon)),
        };

        match fetched {
            Ok(items) => {
                let mut by_id: HashMap<String, MarketplaceProduct> = items
                    .into_iter()
                    .map(|p| (p.source_product_id.to_ascii_uppercase(), p))
                    .collect();
                for product in chunk {
                    let observed = by_id.remove(&product.source_product_id.to_ascii_uppercase());
                    apply(ctx, product, observed, dry_run, &mut tally).await;
                }
            }
            Err(e) => {
                tracing::warn!(batch = ids.len(), error = %e, "amazon batch lookup failed");
                tally.checked += u32::try_from(chunk.len()).unwrap_or(u32::MAX);
                tally.failed += u32::try_from(chunk.len()).unwrap_or(u32::MAX);
            }
        }
    }

    for (index, product) in flipkart.iter().enumerate() {
        if index > 0 || !amazon.is_empty() {
            pause(ctx).await;
        }
        let observed = match &ctx.marketplaces.flipkart {
            Some(client) => client.get_product(&product.source_product_id).await,
            None => Err(MarketplaceError::NotConfigured(Marketplace::Flipkart)),
        };
        match observed {
            Ok(observed) => apply(ctx, product, Some(observed), dry_run, &mut tally).await,
            Err(MarketplaceError::NotFound { .. }) => {
                apply(ctx, product, None, dry_run, &mut tally).await;
            }
            Err(e) => {
                tracing::warn!(product_id = product.id, error = %e, "flipkart lookup failed");
                tally.checked += 1;
                tally.failed += 1;
            }
        }
    }

    Ok(tally)
}

/// Folds one observation into the product. `None` means the marketplace no
/// longer returns the product. Any failure is counted against this product
/// only.
async fn apply(
    ctx: &TrackerContext,
    previous: &ProductRow,
    observed: Option<MarketplaceProduct>,
    dry_run: bool,
    tally: &mut Tally,
) {
    tally.checked += 1;

    let Some(observed) = observed else {
        tracing::warn!(
            product_id = previous.id,
            source_product_id = %previous.source_product_id,
            "product missing from marketplace response"
        );
        count_failure(ctx, previous, dry_run, tally).await;
        return;
    };

    if let Err(e) = apply_observation(ctx, previous, &observed, dry_run, tally).await {
        tracing::warn!(
            product_id = previous.id,
            source_product_id = %previous.source_product_id,
            error = %e,
            "failed to apply refreshed product"
        );
        count_failure(ctx, previous, dry_run, tally).await;
    }
}

/// Moves a failed product to the back of the refresh queue so it cannot
/// starve the products behind it.
async fn count_failure(ctx: &TrackerContext, product: &ProductRow, dry_run: bool, tally: &mut Tally) {
    tally.failed += 1;
    if dry_run {
        return;
    }
    if let Err(e) = amezprice_db::mark_product_checked(&ctx.pool, product.id).await {
        tracing::warn!(product_id = product.id, error = %e, "failed to mark product checked");
    }
}

async fn apply_observation(
    ctx: &TrackerContext,
    previous: &ProductRow,
    observed: &MarketplaceProduct,
    dry_run: bool,
    tally: &mut Tally,
) -> Result<(), TrackerError> {
    let before = previous.price_state();
    if dry_run {
        let after = PriceState {
            price: observed.price.or(before.price),
            in_stock: observed.in_stock,
        };
        if after.price != before.price {
            tally.price_changes += 1;
        }
        if let Some(event) = detect_price_event(before, after) {
            tracing::info!(product_id = previous.id, event = event.as_str(), "would alert");
        }
        return Ok(());
    }

    let updated = store_observation(ctx, observed).await?;
    let after = updated.price_state();
    if after.price != before.price {
        tally.price_changes += 1;
    }

    if let Some(event) = detect_price_event(before, after) {
        let summary = dispatch_price_event(ctx, &updated, &event).await?;
        tally.alerts_sent += summary.delivered();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_names_match_stored_values() {
        assert_eq!(RefreshTrigger::Scheduler.as_str(), "scheduler");
        assert_eq!(RefreshTrigger::Cli.as_str(), "cli");
        assert_eq!(RefreshTrigger::Admin.as_str(), "admin");
    }

    #[test]
    fn tally_converts_to_counters() {
        let tally = Tally {
            checked: 5,
            failed: 1,
            price_changes: 2,
            alerts_sent: 3,
        };
        assert_eq!(
            tally.counters(),
            RefreshCounters {
                products_checked: 5,
                products_failed: 1,
                price_changes: 2,
                alerts_sent: 3,
            }
        );
    }
}
