mod api;
mod middleware;
mod scheduler;
mod session;

use std::sync::Arc;

use amezprice_tracker::TrackerContext;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState, RateLimits},
    session::SessionSettings,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = amezprice_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = amezprice_db::PoolConfig::from_app_config(&config);
    let pool = amezprice_db::connect_pool(&config.database_url, pool_config).await?;
    let applied = amezprice_db::run_migrations(&pool).await?;
    tracing::info!(applied, "migrations up to date");
    let abandoned = amezprice_db::fail_abandoned_refresh_runs(&pool).await?;
    if abandoned > 0 {
        tracing::warn!(abandoned, "failed refresh runs left active by a previous process");
    }

    let tracker = Arc::new(TrackerContext::from_app_config(pool.clone(), &config)?);
    if tracker.marketplaces.amazon.is_none() && tracker.marketplaces.flipkart.is_none() {
        tracing::warn!("no marketplace credentials configured; search serves stored products only");
    }

    let _scheduler = scheduler::build_scheduler(Arc::clone(&tracker), &config.refresh_cron).await?;

    let state = AppState {
        pool,
        tracker,
        sessions: SessionSettings::from_app_config(&config),
    };
    let app = build_app(state, RateLimits::default());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "amezprice server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
