//! Subscription renewal sweep.
//!
//! Providers with expiring subscriptions (Gmail watches last about a week)
//! need their triggers renewed before the expiry hits. Every pass renews
//! active triggers expiring within the lookahead window; a trigger that
//! fails renewal repeatedly is transitioned to `error`.

use chrono::{Duration, Utc};
use hookwire_db::models::TriggerStatus;
use hookwire_db::repositories::TriggerRepo;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{locks, with_advisory_lock, SchedulerContext};
use crate::orchestrator::webhook_context;

/// Renew triggers expiring within this many hours.
pub const RENEWAL_LOOKAHEAD_HOURS: i64 = 24;

/// Consecutive renewal failures tolerated before the trigger goes to `error`.
pub const MAX_RENEWAL_FAILURES: i64 = 3;

/// Counts for one renewal pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RenewalStats {
    pub renewed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Run the renewal loop until cancelled.
pub async fn run(ctx: SchedulerContext, interval_secs: u64, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Renewal task stopping");
                break;
            }
            _ = interval.tick() => {
                match renew_expiring_once(&ctx).await {
                    Ok(Some(stats)) => {
                        if stats.renewed + stats.failed > 0 {
                            tracing::info!(
                                renewed = stats.renewed,
                                failed = stats.failed,
                                skipped = stats.skipped,
                                "Renewal pass completed"
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::error!(error = %e, "Renewal pass failed"),
                }
            }
        }
    }
}

/// One renewal pass under the task's advisory lock.
pub async fn renew_expiring_once(
    ctx: &SchedulerContext,
) -> Result<Option<RenewalStats>, sqlx::Error> {
    with_advisory_lock(&ctx.pool, locks::RENEWAL, "renewal", renew_pass(ctx)).await
}

async fn renew_pass(ctx: &SchedulerContext) -> Result<RenewalStats, sqlx::Error> {
    let cutoff = Utc::now() + Duration::hours(RENEWAL_LOOKAHEAD_HOURS);
    let expiring = TriggerRepo::find_expiring(&ctx.pool, cutoff).await?;

    let mut stats = RenewalStats::default();

    for trigger in expiring {
        let Some(connector) = ctx.connectors.get(&trigger.app_name) else {
            tracing::warn!(
                trigger_id = %trigger.id,
                app = %trigger.app_name,
                "No connector for expiring trigger, skipping renewal"
            );
            stats.skipped += 1;
            continue;
        };

        let account = match ctx.accounts.get(trigger.linked_account_id).await {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(
                    trigger_id = %trigger.id,
                    error = %e,
                    "Linked account unavailable, skipping renewal"
                );
                stats.skipped += 1;
                continue;
            }
        };

        let wctx = match webhook_context(&trigger, &ctx.cipher) {
            Ok(wctx) => wctx,
            Err(e) => {
                tracing::error!(trigger_id = %trigger.id, error = %e, "Cannot build connector context");
                stats.failed += 1;
                continue;
            }
        };

        match connector.renew(&wctx, &account).await {
            Ok(renewal) => {
                TriggerRepo::update_external_id(
                    &ctx.pool,
                    trigger.id,
                    trigger.external_webhook_id.as_deref(),
                    Some(renewal.expires_at),
                )
                .await?;
                if trigger.config_counter("renewal_failures") != 0 {
                    let mut config = trigger.config.clone();
                    config["renewal_failures"] = json!(0);
                    TriggerRepo::update_config(&ctx.pool, trigger.id, &config).await?;
                }
                ctx.metrics.renewal(&trigger.app_name, "success");
                stats.renewed += 1;
                tracing::info!(
                    trigger_id = %trigger.id,
                    expires_at = %renewal.expires_at,
                    "Subscription renewed"
                );
            }
            Err(hookwire_connectors::ConnectorError::NotSupported) => {
                stats.skipped += 1;
            }
            Err(e) => {
                let failures = trigger.config_counter("renewal_failures") + 1;
                let mut config = trigger.config.clone();
                config["renewal_failures"] = json!(failures);
                TriggerRepo::update_config(&ctx.pool, trigger.id, &config).await?;

                if failures >= MAX_RENEWAL_FAILURES {
                    TriggerRepo::update_status(
                        &ctx.pool,
                        trigger.id,
                        TriggerStatus::Error,
                        Some(&e.to_string()),
                    )
                    .await?;
                    tracing::error!(
                        trigger_id = %trigger.id,
                        failures,
                        error = %e,
                        "Renewal failed repeatedly, trigger moved to error"
                    );
                } else {
                    tracing::warn!(
                        trigger_id = %trigger.id,
                        failures,
                        error = %e,
                        "Renewal failed, will retry next pass"
                    );
                }
                ctx.metrics.renewal(&trigger.app_name, "failed");
                stats.failed += 1;
            }
        }
    }

    Ok(stats)
}
