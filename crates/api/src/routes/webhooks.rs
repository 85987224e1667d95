//! The webhook receiver — the platform's hot path.
//!
//! `POST /webhooks/{app_name}/{trigger_id}` runs, in order: admission
//! control, trigger lookup, provider challenge handling, signature
//! verification, payload parsing, and deduplicated persistence. The raw body
//! is read once and passed to the connector verbatim; nothing here calls out
//! to a provider. `GET` serves query-parameter URL-verification probes.

use std::collections::HashMap;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use hookwire_core::error::CoreError;
use hookwire_core::types::Id;
use hookwire_db::models::{NewTriggerEvent, Trigger, TriggerStatus};
use hookwire_db::repositories::{TriggerEventRepo, TriggerRepo};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::orchestrator::webhook_context;
use crate::response::WebhookAck;
use crate::state::AppState;

/// POST /webhooks/{app_name}/{trigger_id}
///
/// Receives one provider delivery. Responds within the provider's timeout;
/// all downstream processing is asynchronous via the stored event row.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path((app_name, trigger_id)): Path<(String, Id)>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<axum::response::Response> {
    let started = Instant::now();
    let app = app_name.to_uppercase();

    // 1. Admission: per-IP and per-trigger token buckets, both or nothing.
    let ip = client_ip(&headers);
    if let Err(exceeded) = state.rate_limiter.check(&ip, &trigger_id.to_string()) {
        state.metrics.rate_limit_hit(exceeded.scope.as_str());
        return Err(AppError::RateLimited {
            scope: exceeded.scope.as_str(),
            retry_after_secs: exceeded.retry_after_secs,
        });
    }

    // 2. Lookup. A mismatched app path segment is a client error, not a miss.
    let trigger = load_trigger(&state, trigger_id).await?;
    if trigger.app_name != app {
        return Err(AppError::BadRequest(format!(
            "trigger {trigger_id} does not belong to app {app_name}"
        )));
    }

    let connector = state
        .connectors
        .get(&app)
        .ok_or_else(|| AppError::BadRequest(format!("no connector for app {app_name}")))?;
    let ctx = webhook_context(&trigger, &state.cipher)?;

    // 3. Challenge: answered before the active-status check, because
    //    providers probe the URL before activation is confirmed. The
    //    signature is still verified where the provider sends one.
    if let Some(challenge) = connector.challenge(&body, &headers) {
        if let Err(e) = connector.verify(&body, &headers, &ctx) {
            if e.is_verification_failure() {
                state.metrics.webhook_verification_failed(&app);
            }
            return Err(e.into());
        }
        tracing::info!(trigger_id = %trigger_id, app = %app, "Answered URL-verification challenge");
        let mut response_body = challenge.body;
        if let Some(object) = response_body.as_object_mut() {
            object.insert("status".into(), json!("challenge"));
        }
        return Ok(Json(response_body).into_response());
    }

    // Only active triggers accept deliveries.
    if trigger.status != TriggerStatus::Active {
        return Err(AppError::Gone(format!(
            "trigger is {}",
            trigger.status
        )));
    }

    // 4. Verify before anything touches storage.
    if let Err(e) = connector.verify(&body, &headers, &ctx) {
        if e.is_verification_failure() {
            state.metrics.webhook_verification_failed(&app);
            tracing::warn!(
                trigger_id = %trigger_id,
                app = %app,
                error = %e,
                "Webhook verification failed"
            );
        }
        return Err(e.into());
    }

    // 5. Parse.
    let events = connector.parse(&body, &headers, &ctx)?;

    // 6. Persist with insert-or-ignore dedup, one row per parsed event.
    let expires_at = Utc::now() + Duration::days(state.config.event_retention_days);
    let mut received = 0usize;
    let mut duplicates = 0usize;
    let mut event_ids = Vec::with_capacity(events.len());

    for event in events {
        let input = NewTriggerEvent {
            trigger_id,
            event_type: event.event_type,
            event_data: event.event_data,
            external_event_id: event.external_event_id,
            expires_at,
        };
        let (row, inserted) = TriggerEventRepo::create(&state.pool, &input).await?;
        event_ids.push(row.id);
        if inserted {
            received += 1;
            state.metrics.webhook_received(&app);
        } else {
            duplicates += 1;
            state.metrics.webhook_dedup(&app);
        }
    }

    // 7. Post-conditions: best-effort bookkeeping never fails the request.
    if let Err(e) = TriggerRepo::touch_last_triggered(&state.pool, trigger_id, Utc::now()).await {
        tracing::warn!(trigger_id = %trigger_id, error = %e, "Failed to update last_triggered_at");
    }

    state
        .metrics
        .observe_processing_duration(&app, started.elapsed().as_secs_f64());

    tracing::info!(
        trigger_id = %trigger_id,
        app = %app,
        received,
        duplicates,
        "Webhook processed"
    );

    let status = if received == 0 && duplicates > 0 {
        "duplicate"
    } else {
        "ok"
    };
    Ok(Json(WebhookAck {
        status,
        received,
        duplicates,
        event_ids,
    })
    .into_response())
}

/// GET /webhooks/{app_name}/{trigger_id}
///
/// Echoes the provider's `challenge` query parameter. The trigger row must
/// exist (it holds the verification material) but need not be active yet.
pub async fn challenge_webhook(
    State(state): State<AppState>,
    Path((app_name, trigger_id)): Path<(String, Id)>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<serde_json::Value>> {
    let trigger = load_trigger(&state, trigger_id).await?;
    if trigger.app_name != app_name.to_uppercase() {
        return Err(AppError::BadRequest(format!(
            "trigger {trigger_id} does not belong to app {app_name}"
        )));
    }

    let challenge = params
        .get("challenge")
        .ok_or_else(|| AppError::BadRequest("missing challenge parameter".into()))?;

    tracing::info!(
        trigger_id = %trigger_id,
        app = %app_name,
        "Answered GET challenge probe"
    );

    Ok(Json(json!({ "challenge": challenge, "status": "challenge" })))
}

/// Mount the webhook receiver routes.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/webhooks/{app_name}/{trigger_id}",
        post(receive_webhook).get(challenge_webhook),
    )
}

async fn load_trigger(state: &AppState, trigger_id: Id) -> AppResult<Trigger> {
    TriggerRepo::find_by_id(&state.pool, trigger_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Trigger",
            id: trigger_id,
        }))
}

/// Source address for admission control.
///
/// Behind the load balancer the peer address is the proxy, so the leftmost
/// `X-Forwarded-For` entry wins; `X-Real-IP` is the fallback.
fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "unknown".to_string())
}
