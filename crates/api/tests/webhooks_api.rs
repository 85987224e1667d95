//! HTTP-level integration tests for the webhook receiver.
//!
//! Uses Axum's `tower::ServiceExt` to send requests directly to the router
//! with real provider signature schemes, against a fresh schema per test.

mod common;

use axum::http::StatusCode;
use chrono::Utc;
use common::{
    body_json, get, github_signature, hubspot_signature, post_bytes, shopify_signature,
    slack_signature, TestHarness,
};
use hookwire_api::rate_limit::RateSettings;
use hookwire_db::models::TriggerStatus;
use hookwire_db::repositories::TriggerEventRepo;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// GitHub: signature verification and dedup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn github_duplicate_delivery_is_stored_once(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, secret) = harness
        .seed_trigger(
            "GITHUB",
            "push",
            TriggerStatus::Active,
            serde_json::json!({"owner": "octocat", "repo": "hello"}),
        )
        .await;

    let uri = format!("/webhooks/github/{}", trigger.id);
    let body = br#"{"ref":"refs/heads/main","after":"abc123"}"#.to_vec();
    let signature = github_signature(&secret, &body);
    let headers = [
        ("X-Hub-Signature-256", signature.as_str()),
        ("X-GitHub-Event", "push"),
        ("X-GitHub-Delivery", "d1"),
    ];

    // First delivery is stored.
    let response = post_bytes(harness.app(), &uri, &headers, body.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["received"], 1);

    // Identical retry acknowledges as duplicate, no new row.
    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "duplicate");
    assert_eq!(json["duplicates"], 1);

    let count = TriggerEventRepo::count(&harness.pool, trigger.id, None)
        .await
        .unwrap();
    assert_eq!(count, 1);

    let event = TriggerEventRepo::find_by_dedup_key(&harness.pool, trigger.id, "d1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_data["after"], "abc123");
    assert_eq!(
        harness.metrics.counter_value("webhook_dedup_total", &[("app", "GITHUB")]),
        1
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn github_bad_signature_is_rejected_without_persisting(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _secret) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/github/{}", trigger.id);
    let body = br#"{"ref":"refs/heads/main"}"#.to_vec();
    let signature = github_signature("not-the-secret", &body);
    let headers = [
        ("X-Hub-Signature-256", signature.as_str()),
        ("X-GitHub-Delivery", "d1"),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Signature-before-persist: nothing was written.
    let count = TriggerEventRepo::count(&harness.pool, trigger.id, None)
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(
        harness
            .metrics
            .counter_value("webhook_verification_failed_total", &[("app", "GITHUB")]),
        1
    );
}

// ---------------------------------------------------------------------------
// Slack: replay protection and URL verification
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn slack_replay_with_valid_hmac_is_rejected(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger("SLACK", "message", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/slack/{}", trigger.id);
    let body = br#"{"type":"event_callback","event_id":"Ev1","event":{"type":"message"}}"#.to_vec();
    // Mathematically correct signature over a 10-minute-old timestamp.
    let (ts, sig) = slack_signature(Utc::now().timestamp() - 600, &body);
    let headers = [
        ("X-Slack-Request-Timestamp", ts.as_str()),
        ("X-Slack-Signature", sig.as_str()),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let count = TriggerEventRepo::count(&harness.pool, trigger.id, None)
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(
        harness
            .metrics
            .counter_value("webhook_verification_failed_total", &[("app", "SLACK")]),
        1
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn slack_fresh_event_is_stored(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger("SLACK", "message", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/slack/{}", trigger.id);
    let body = br#"{"type":"event_callback","event_id":"Ev1","event":{"type":"message"}}"#.to_vec();
    let (ts, sig) = slack_signature(Utc::now().timestamp(), &body);
    let headers = [
        ("X-Slack-Request-Timestamp", ts.as_str()),
        ("X-Slack-Signature", sig.as_str()),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::OK);

    let event = TriggerEventRepo::find_by_dedup_key(&harness.pool, trigger.id, "Ev1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event_type, "message");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn slack_url_verification_works_before_activation(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    // The trigger is still pending: providers probe before activation.
    let (trigger, _) = harness
        .seed_trigger("SLACK", "message", TriggerStatus::Pending, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/slack/{}", trigger.id);
    let body = br#"{"type":"url_verification","challenge":"c-42","token":"t"}"#.to_vec();
    let (ts, sig) = slack_signature(Utc::now().timestamp(), &body);
    let headers = [
        ("X-Slack-Request-Timestamp", ts.as_str()),
        ("X-Slack-Signature", sig.as_str()),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["challenge"], "c-42");
    assert_eq!(json["status"], "challenge");

    // Challenges are never persisted.
    let count = TriggerEventRepo::count(&harness.pool, trigger.id, None)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn slack_challenge_with_bad_signature_is_rejected(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger("SLACK", "message", TriggerStatus::Pending, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/slack/{}", trigger.id);
    let body = br#"{"type":"url_verification","challenge":"c-42"}"#.to_vec();
    let ts = Utc::now().timestamp().to_string();
    let headers = [
        ("X-Slack-Request-Timestamp", ts.as_str()),
        ("X-Slack-Signature", "v0=deadbeef"),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// HubSpot: batched deliveries under one signature
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn hubspot_batch_stores_one_row_per_event_id(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger(
            "HUBSPOT",
            "contact.creation",
            TriggerStatus::Active,
            serde_json::json!({}),
        )
        .await;

    let uri = format!("/webhooks/hubspot/{}", trigger.id);
    let body = serde_json::to_vec(&serde_json::json!([
        {"eventId": "e1", "eventType": "contact.creation", "objectId": 1},
        {"eventId": "e2", "eventType": "contact.creation", "objectId": 2},
    ]))
    .unwrap();
    let (ts, sig) = hubspot_signature(&trigger.webhook_url, &body, Utc::now().timestamp_millis());
    let headers = [
        ("X-HubSpot-Signature-V3", sig.as_str()),
        ("X-HubSpot-Request-Timestamp", ts.as_str()),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["received"], 2);

    let count = TriggerEventRepo::count(&harness.pool, trigger.id, None)
        .await
        .unwrap();
    assert_eq!(count, 2);

    // Replaying the whole batch inserts zero additional rows.
    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "duplicate");
    assert_eq!(json["duplicates"], 2);

    let count = TriggerEventRepo::count(&harness.pool, trigger.id, None)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

// ---------------------------------------------------------------------------
// Shopify: raw-body HMAC
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn shopify_hmac_accepts_exact_body_and_rejects_tamper(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger(
            "SHOPIFY",
            "orders/create",
            TriggerStatus::Active,
            serde_json::json!({}),
        )
        .await;

    let uri = format!("/webhooks/shopify/{}", trigger.id);
    let body = br#"{"id":1}"#.to_vec();
    let sig = shopify_signature(&body);
    let headers = [
        ("X-Shopify-Hmac-SHA256", sig.as_str()),
        ("X-Shopify-Topic", "orders/create"),
        ("X-Shopify-Webhook-Id", "wh-1"),
    ];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Same signature over a body with one byte toggled must be rejected.
    let response = post_bytes(harness.app(), &uri, &headers, br#"{"id":2}"#.to_vec()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Admission control
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn per_trigger_rate_limit_returns_429_with_retry_after(pool: PgPool) {
    let mut config = common::test_config();
    config.trigger_rate = RateSettings {
        capacity: 2.0,
        refill_per_sec: 1.0,
    };
    let harness = TestHarness::with_config(pool, config).await;
    let (trigger, secret) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/github/{}", trigger.id);
    let body = br#"{"ref":"refs/heads/main"}"#.to_vec();
    let signature = github_signature(&secret, &body);

    let mut ok = 0;
    let mut limited = 0;
    for i in 0..5 {
        let delivery = format!("d{i}");
        let headers = [
            ("X-Hub-Signature-256", signature.as_str()),
            ("X-GitHub-Delivery", delivery.as_str()),
        ];
        let response = post_bytes(harness.app(), &uri, &headers, body.clone()).await;
        match response.status() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => {
                limited += 1;
                assert_eq!(
                    response.headers().get("retry-after").unwrap().to_str().unwrap(),
                    "1"
                );
            }
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!(ok, 2);
    assert_eq!(limited, 3);
    assert_eq!(
        harness
            .metrics
            .counter_value("rate_limit_hit_total", &[("scope", "trigger")]),
        3
    );
}

// ---------------------------------------------------------------------------
// Lookup failures
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn unknown_trigger_is_404(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let uri = format!("/webhooks/github/{}", Uuid::new_v4());
    let response = post_bytes(harness.app(), &uri, &[], b"{}".to_vec()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn paused_trigger_is_410(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, secret) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Paused, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/github/{}", trigger.id);
    let body = br#"{"ref":"refs/heads/main"}"#.to_vec();
    let signature = github_signature(&secret, &body);
    let headers = [("X-Hub-Signature-256", signature.as_str())];

    let response = post_bytes(harness.app(), &uri, &headers, body).await;
    assert_eq!(response.status(), StatusCode::GONE);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("paused"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn app_name_mismatch_is_400(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/slack/{}", trigger.id);
    let response = post_bytes(harness.app(), &uri, &[], b"{}".to_vec()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// GET challenge probe
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn get_challenge_echoes_parameter(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Pending, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/github/{}?challenge=probe-1", trigger.id);
    let response = get(harness.app(), &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["challenge"], "probe-1");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn get_challenge_without_parameter_is_400(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, _) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/github/{}", trigger.id);
    let response = get(harness.app(), &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Observability surface
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn health_endpoint_reports_database(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let response = get(harness.app(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["db_healthy"], true);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn metrics_endpoint_exports_counters(pool: PgPool) {
    let harness = TestHarness::new(pool).await;
    let (trigger, secret) = harness
        .seed_trigger("GITHUB", "push", TriggerStatus::Active, serde_json::json!({}))
        .await;

    let uri = format!("/webhooks/github/{}", trigger.id);
    let body = br#"{"ref":"refs/heads/main"}"#.to_vec();
    let signature = github_signature(&secret, &body);
    let headers = [
        ("X-Hub-Signature-256", signature.as_str()),
        ("X-GitHub-Delivery", "d1"),
    ];
    post_bytes(harness.app(), &uri, &headers, body).await;

    let response = get(harness.app(), "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let text = http_body_util::BodyExt::collect(response.into_body())
        .await
        .unwrap()
        .to_bytes();
    let text = String::from_utf8(text.to_vec()).unwrap();
    assert!(text.contains("webhook_received_total{app=\"GITHUB\"} 1"));
    assert!(text.contains("webhook_processing_duration_seconds_count{app=\"GITHUB\"} 1"));
}
