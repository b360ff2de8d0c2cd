//! Background job scheduler.
//!
//! Registers the recurring price refresh and the hourly session purge.

use std::sync::Arc;

use amezprice_db::DbError;
use amezprice_tracker::{
    refresh_prices, RefreshOptions, RefreshTrigger, TrackerContext, TrackerError,
};
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Top of every hour.
const SESSION_PURGE_CRON: &str = "0 0 * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a cron expression is invalid, or the scheduler fails to start.
pub async fn build_scheduler(
    tracker: Arc<TrackerContext>,
    refresh_cron: &str,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    register_refresh_job(&scheduler, Arc::clone(&tracker), refresh_cron).await?;
    register_session_purge_job(&scheduler, tracker).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Runs [`refresh_prices`] on `cron`. Failures are recorded on the run row
/// and logged; the next tick tries again. A tick that lands while another
/// run is active is skipped.
async fn register_refresh_job(
    scheduler: &JobScheduler,
    tracker: Arc<TrackerContext>,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let tracker = Arc::clone(&tracker);

        Box::pin(async move {
            tracing::info!("scheduler: starting price refresh");
            let options = RefreshOptions {
                trigger: RefreshTrigger::Scheduler,
                dry_run: false,
            };
            match refresh_prices(&tracker, options).await {
                Ok(summary) => tracing::info!(
                    run_id = ?summary.run_id,
                    checked = summary.counters.products_checked,
                    failed = summary.counters.products_failed,
                    "scheduler: price refresh complete"
                ),
                Err(TrackerError::Db(DbError::RefreshRunInProgress)) => {
                    tracing::info!("scheduler: refresh run already active, skipping tick");
                }
                Err(e) => tracing::error!(error = %e, "scheduler: price refresh failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(cron, "scheduler: price refresh registered");
    Ok(())
}

async fn register_session_purge_job(
    scheduler: &JobScheduler,
    tracker: Arc<TrackerContext>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(SESSION_PURGE_CRON, move |_uuid, _lock| {
        let tracker = Arc::clone(&tracker);

        Box::pin(async move {
            match amezprice_db::purge_expired_sessions(&tracker.pool).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "scheduler: expired sessions purged"),
                Err(e) => tracing::error!(error = %e, "scheduler: session purge failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
