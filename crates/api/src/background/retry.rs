//! Failed-registration retry sweep.
//!
//! Triggers stuck in `error` after a failed registration get another
//! attempt: at most [`MAX_REGISTRATION_RETRIES`](crate::orchestrator::MAX_REGISTRATION_RETRIES)
//! tries, no sooner than five minutes after the previous one, and only for
//! failures younger than a day.

use chrono::{Duration, Utc};
use hookwire_db::models::TriggerStatus;
use hookwire_db::repositories::TriggerRepo;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{locks, with_advisory_lock, SchedulerContext};
use crate::orchestrator::{webhook_context, MAX_REGISTRATION_RETRIES};

/// Ignore error triggers older than this; stale failures need operator eyes.
const MAX_FAILURE_AGE_HOURS: i64 = 24;

/// Minimum gap between attempts for one trigger.
const RETRY_BACKOFF_MINUTES: i64 = 5;

/// Counts for one retry pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RetryStats {
    pub succeeded: usize,
    pub failed: usize,
}

/// Run the retry loop until cancelled.
pub async fn run(ctx: SchedulerContext, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Registration retry task stopping");
                break;
            }
            _ = interval.tick() => {
                match retry_failed_once(&ctx).await {
                    Ok(Some(stats)) => {
                        if stats.succeeded + stats.failed > 0 {
                            tracing::info!(
                                succeeded = stats.succeeded,
                                failed = stats.failed,
                                "Registration retry pass completed"
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "Registration retry pass failed"),
                }
            }
        }
    }
}

/// One retry pass under the task's advisory lock.
pub async fn retry_failed_once(
    ctx: &SchedulerContext,
) -> Result<Option<RetryStats>, sqlx::Error> {
    with_advisory_lock(&ctx.pool, locks::RETRY, "retry", retry_pass(ctx)).await
}

async fn retry_pass(ctx: &SchedulerContext) -> Result<RetryStats, sqlx::Error> {
    let now = Utc::now();
    let candidates = TriggerRepo::find_failed_registrations(
        &ctx.pool,
        now - Duration::hours(MAX_FAILURE_AGE_HOURS),
        now - Duration::minutes(RETRY_BACKOFF_MINUTES),
        MAX_REGISTRATION_RETRIES,
    )
    .await?;

    let mut stats = RetryStats::default();

    for trigger in candidates {
        let attempt = trigger.config_counter("retry_count") + 1;
        tracing::info!(
            trigger_id = %trigger.id,
            attempt,
            max = MAX_REGISTRATION_RETRIES,
            "Retrying webhook registration"
        );

        let Some(connector) = ctx.connectors.get(&trigger.app_name) else {
            tracing::warn!(
                trigger_id = %trigger.id,
                app = %trigger.app_name,
                "No connector for error trigger, leaving as is"
            );
            continue;
        };

        let account = match ctx.accounts.get(trigger.linked_account_id).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(trigger_id = %trigger.id, error = %e, "Linked account unavailable");
                continue;
            }
        };

        let wctx = match webhook_context(&trigger, &ctx.cipher) {
            Ok(wctx) => wctx,
            Err(e) => {
                tracing::error!(trigger_id = %trigger.id, error = %e, "Cannot build connector context");
                continue;
            }
        };

        match connector.register(&wctx, &account).await {
            Ok(registration) => {
                TriggerRepo::update_external_id(
                    &ctx.pool,
                    trigger.id,
                    registration.external_webhook_id.as_deref(),
                    registration.expires_at,
                )
                .await?;
                let mut config = trigger.config.clone();
                config["retry_count"] = json!(0);
                TriggerRepo::update_config(&ctx.pool, trigger.id, &config).await?;
                TriggerRepo::update_status(&ctx.pool, trigger.id, TriggerStatus::Active, None)
                    .await?;

                ctx.metrics
                    .trigger_registration(&trigger.app_name, "retry_success");
                stats.succeeded += 1;
                tracing::info!(trigger_id = %trigger.id, "Registration retry succeeded");
            }
            Err(e) => {
                let mut config = trigger.config.clone();
                config["retry_count"] = json!(attempt);
                TriggerRepo::update_config(&ctx.pool, trigger.id, &config).await?;
                TriggerRepo::update_status(
                    &ctx.pool,
                    trigger.id,
                    TriggerStatus::Error,
                    Some(&e.to_string()),
                )
                .await?;

                ctx.metrics
                    .trigger_registration(&trigger.app_name, "retry_failed");
                stats.failed += 1;
                tracing::warn!(
                    trigger_id = %trigger.id,
                    attempt,
                    error = %e,
                    "Registration retry failed"
                );
            }
        }
    }

    Ok(stats)
}
