//! Background job scheduler.
//!
//! Registers the stale-execution sweep at server startup: every minute,
//! each live execution goes through the lazy timeout check, so jobs whose
//! clients stopped polling still reach a terminal state.

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use geodx_engine::DiagnosisEngine;

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(engine: DiagnosisEngine) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let engine = engine.clone();
        Box::pin(async move {
            let swept = engine.sweep_stale().await;
            if swept > 0 {
                tracing::warn!(count = swept, "scheduler: swept stale executions to timeout");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;
    Ok(scheduler)
}
