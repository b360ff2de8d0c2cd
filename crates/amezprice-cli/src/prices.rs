//! `prices` subcommands.

use amezprice_tracker::{refresh_prices, RefreshOptions, RefreshTrigger, TrackerContext};
use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum PricesCommands {
    /// Re-fetch tracked products, record prices and send alerts
    Refresh {
        /// Fetch and compare only; no writes and no alerts
        #[arg(long)]
        dry_run: bool,
    },
}

pub(crate) async fn run(ctx: &TrackerContext, command: PricesCommands) -> anyhow::Result<()> {
    match command {
        PricesCommands::Refresh { dry_run } => {
            let summary = refresh_prices(
                ctx,
                RefreshOptions {
                    trigger: RefreshTrigger::Cli,
                    dry_run,
                },
            )
            .await?;

            let counters = summary.counters;
            match summary.run_id {
                Some(run_id) => println!("refresh run {run_id} finished"),
                None => println!("dry-run: nothing was written"),
            }
            println!(
                "checked {}, failed {}, price changes {}, alerts sent {}",
                counters.products_checked,
                counters.products_failed,
                counters.price_changes,
                counters.alerts_sent
            );
            Ok(())
        }
    }
}
