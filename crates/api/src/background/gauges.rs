//! Periodic refresh of the database-derived metric gauges.

use hookwire_db::repositories::{TriggerEventRepo, TriggerRepo};
use tokio_util::sync::CancellationToken;

use super::SchedulerContext;

/// Run the gauge refresh loop until cancelled.
pub async fn run(ctx: SchedulerContext, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Gauge refresh task stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = refresh_once(&ctx).await {
                    tracing::warn!(error = %e, "Gauge refresh failed");
                }
            }
        }
    }
}

/// Read the gauge values from the database and publish them.
pub async fn refresh_once(ctx: &SchedulerContext) -> Result<(), sqlx::Error> {
    let active = TriggerRepo::count_active(&ctx.pool).await?;
    let pending = TriggerEventRepo::count_pending(&ctx.pool).await?;
    ctx.metrics.set_active_triggers(active);
    ctx.metrics.set_pending_events(pending);
    Ok(())
}
