mod admin;
mod prices;
mod search;

use amezprice_tracker::TrackerContext;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::admin::AdminCommands;
use crate::prices::PricesCommands;

#[derive(Debug, Parser)]
#[command(name = "amezprice-cli")]
#[command(about = "AmezPrice command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Account administration
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Look up a product by its Amazon or Flipkart URL
    Search {
        /// Product page or short link
        url: String,
        /// Fetch and print only; nothing is stored
        #[arg(long)]
        dry_run: bool,
    },
    /// Price refresh
    Prices {
        #[command(subcommand)]
        command: PricesCommands,
    },
    /// Session housekeeping
    Sessions {
        #[command(subcommand)]
        command: SessionsCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[derive(Debug, Subcommand)]
enum SessionsCommands {
    /// Delete expired sessions
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("amezprice-cli: no command given; run with --help for usage");
        return Ok(());
    };

    let config = amezprice_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = amezprice_db::PoolConfig::from_app_config(&config);
    let pool = amezprice_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db { command } => match command {
            DbCommands::Ping => {
                amezprice_db::ping(&pool).await?;
                println!("database ok");
            }
            DbCommands::Migrate => {
                let applied = amezprice_db::run_migrations(&pool).await?;
                println!("applied {applied} migration(s)");
            }
        },
        Commands::Admin { command } => admin::run(&pool, command).await?,
        Commands::Search { url, dry_run } => {
            let ctx = TrackerContext::from_app_config(pool, &config)?;
            search::run_search(&ctx, &url, dry_run).await?;
        }
        Commands::Prices { command } => {
            let ctx = TrackerContext::from_app_config(pool, &config)?;
            prices::run(&ctx, command).await?;
        }
        Commands::Sessions {
            command: SessionsCommands::Purge,
        } => {
            let purged = amezprice_db::purge_expired_sessions(&pool).await?;
            println!("purged {purged} expired session(s)");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
