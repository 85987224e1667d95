//! Expired-trigger sweep.
//!
//! Any active trigger whose `expires_at` has passed is transitioned to
//! `expired` within one pass of this task.

use chrono::Utc;
use hookwire_db::repositories::TriggerRepo;
use tokio_util::sync::CancellationToken;

use super::{locks, with_advisory_lock, SchedulerContext};

/// Run the expiry loop until cancelled.
pub async fn run(ctx: SchedulerContext, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Expiry task stopping");
                break;
            }
            _ = interval.tick() => {
                match mark_expired_once(&ctx).await {
                    Ok(Some(count)) if count > 0 => {
                        tracing::info!(count, "Marked triggers as expired");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "Expiry pass failed"),
                }
            }
        }
    }
}

/// One expiry pass under the task's advisory lock. Returns the number of
/// triggers transitioned.
pub async fn mark_expired_once(ctx: &SchedulerContext) -> Result<Option<u64>, sqlx::Error> {
    with_advisory_lock(
        &ctx.pool,
        locks::EXPIRY,
        "expiry",
        TriggerRepo::mark_expired(&ctx.pool, Utc::now()),
    )
    .await
}
