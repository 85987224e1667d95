//! Event retention cleanup.
//!
//! Deletes trigger events past their `expires_at` (30 days after receipt by
//! default). Runs daily; a pass is a single bulk DELETE.

use chrono::Utc;
use hookwire_db::repositories::TriggerEventRepo;
use tokio_util::sync::CancellationToken;

use super::{locks, with_advisory_lock, SchedulerContext};

/// Run the cleanup loop until cancelled.
pub async fn run(ctx: SchedulerContext, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Event cleanup task stopping");
                break;
            }
            _ = interval.tick() => {
                match cleanup_events_once(&ctx).await {
                    Ok(Some(deleted)) if deleted > 0 => {
                        tracing::info!(deleted, "Event cleanup: purged expired rows");
                    }
                    Ok(_) => {
                        tracing::debug!("Event cleanup: no rows to purge");
                    }
                    Err(e) => tracing::error!(error = %e, "Event cleanup failed"),
                }
            }
        }
    }
}

/// One cleanup pass under the task's advisory lock. Returns the number of
/// events deleted.
pub async fn cleanup_events_once(ctx: &SchedulerContext) -> Result<Option<u64>, sqlx::Error> {
    with_advisory_lock(
        &ctx.pool,
        locks::CLEANUP,
        "cleanup",
        TriggerEventRepo::delete_expired(&ctx.pool, Utc::now()),
    )
    .await
}
