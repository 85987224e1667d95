// All items in this module are shared test helpers. Not every test binary
// uses every helper, so we suppress dead_code warnings at the module level.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

use hookwire_api::accounts::InMemoryAccountStore;
use hookwire_api::background::SchedulerContext;
use hookwire_api::config::{SchedulerConfig, ServerConfig};
use hookwire_api::metrics::MetricsCollector;
use hookwire_api::orchestrator::TriggerOrchestrator;
use hookwire_api::rate_limit::{RateLimiter, RateSettings};
use hookwire_api::router::build_app_router;
use hookwire_api::state::AppState;
use hookwire_connectors::{
    ChallengeResponse, Connector, ConnectorError, ConnectorRegistry, ConnectorSettings,
    ParsedEvent, Registration, Renewal, WebhookContext,
};
use hookwire_core::account::{Credentials, LinkedAccount};
use hookwire_core::secret::TokenCipher;
use hookwire_core::token::generate_verification_token;
use hookwire_db::models::{NewTrigger, Trigger, TriggerStatus};
use hookwire_db::repositories::TriggerRepo;

pub const TEST_TOKEN_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
pub const SLACK_SIGNING_SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
pub const HUBSPOT_APP_SECRET: &str = "hubspot-test-secret";
pub const SHOPIFY_CLIENT_SECRET: &str = "hush";

type HmacSha256 = Hmac<Sha256>;

/// Build a test `ServerConfig` with all provider secrets set and generous
/// rate limits.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        callback_base_url: "http://localhost:3000".to_string(),
        request_timeout_secs: 30,
        global_rate: RateSettings {
            capacity: 200.0,
            refill_per_sec: 100.0,
        },
        trigger_rate: RateSettings {
            capacity: 20.0,
            refill_per_sec: 10.0,
        },
        event_retention_days: 30,
        token_key: TEST_TOKEN_KEY.to_string(),
        connectors: ConnectorSettings {
            replay_skew_secs: 300,
            hubspot_app_id: Some("12345".to_string()),
            hubspot_app_secret: Some(HUBSPOT_APP_SECRET.to_string()),
            shopify_client_secret: Some(SHOPIFY_CLIENT_SECRET.to_string()),
            slack_signing_secret: Some(SLACK_SIGNING_SECRET.to_string()),
            gmail_pubsub_topic: Some("projects/hookwire-test/topics/gmail".to_string()),
            gmail_push_audience: None,
            gmail_oidc_public_key_pem: None,
        },
        scheduler: SchedulerConfig {
            renewal_interval_secs: 6 * 3600,
            expiry_interval_secs: 3600,
            retry_interval_secs: 1800,
            cleanup_interval_secs: 24 * 3600,
            gauge_interval_secs: 60,
        },
    }
}

/// Everything an integration test needs, sharing the same components the
/// production binary wires together.
pub struct TestHarness {
    pub pool: PgPool,
    pub config: ServerConfig,
    pub cipher: Arc<TokenCipher>,
    pub accounts: Arc<InMemoryAccountStore>,
    pub connectors: Arc<ConnectorRegistry>,
    pub metrics: Arc<MetricsCollector>,
    pub state: AppState,
}

impl TestHarness {
    pub async fn new(pool: PgPool) -> Self {
        Self::build(pool, test_config(), None).await
    }

    pub async fn with_config(pool: PgPool, config: ServerConfig) -> Self {
        Self::build(pool, config, None).await
    }

    /// Harness whose registry additionally serves `mock` (replacing any
    /// default connector for the same app name).
    pub async fn with_mock(pool: PgPool, mock: Arc<MockConnector>) -> Self {
        Self::build(pool, test_config(), Some(mock)).await
    }

    async fn build(pool: PgPool, config: ServerConfig, mock: Option<Arc<MockConnector>>) -> Self {
        let cipher = Arc::new(TokenCipher::from_base64_key(&config.token_key).unwrap());
        let accounts = Arc::new(InMemoryAccountStore::new());
        let metrics = Arc::new(MetricsCollector::new());
        let rate_limiter = Arc::new(RateLimiter::new(config.global_rate, config.trigger_rate));

        let mut registry = ConnectorRegistry::with_defaults(&config.connectors);
        if let Some(mock) = mock {
            registry.insert(mock);
        }
        let connectors = Arc::new(registry);

        let state = AppState {
            pool: pool.clone(),
            config: Arc::new(config.clone()),
            connectors: Arc::clone(&connectors),
            rate_limiter,
            metrics: Arc::clone(&metrics),
            cipher: Arc::clone(&cipher),
            accounts: accounts.clone(),
        };

        Self {
            pool,
            config,
            cipher,
            accounts,
            connectors,
            metrics,
            state,
        }
    }

    /// The full application router with the production middleware stack.
    pub fn app(&self) -> Router {
        build_app_router(self.state.clone(), &self.config)
    }

    pub fn orchestrator(&self) -> TriggerOrchestrator {
        TriggerOrchestrator::new(
            self.pool.clone(),
            Arc::clone(&self.connectors),
            self.accounts.clone(),
            Arc::clone(&self.cipher),
            Arc::clone(&self.metrics),
            self.config.callback_base_url.clone(),
        )
    }

    pub fn scheduler_ctx(&self) -> SchedulerContext {
        SchedulerContext {
            pool: self.pool.clone(),
            connectors: Arc::clone(&self.connectors),
            accounts: self.accounts.clone(),
            cipher: Arc::clone(&self.cipher),
            metrics: Arc::clone(&self.metrics),
        }
    }

    /// Register an OAuth2 linked account for an app and return its id.
    pub fn seed_account(&self, app_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.accounts.insert(LinkedAccount {
            id,
            app_name: app_name.to_string(),
            credentials: Credentials::Oauth2 {
                access_token: "test-access-token".into(),
            },
            metadata: Default::default(),
        });
        id
    }

    /// Insert a trigger row directly (bypassing the orchestrator, so no
    /// provider call happens). Returns the row and the plaintext
    /// verification token.
    pub async fn seed_trigger(
        &self,
        app_name: &str,
        trigger_type: &str,
        status: TriggerStatus,
        config: serde_json::Value,
    ) -> (Trigger, String) {
        let id = Uuid::new_v4();
        let token = generate_verification_token();
        let input = NewTrigger {
            id,
            project_id: Uuid::new_v4(),
            app_name: app_name.to_string(),
            linked_account_id: self.seed_account(app_name),
            trigger_name: format!("test-{id}"),
            trigger_type: trigger_type.to_string(),
            description: None,
            webhook_url: format!(
                "{}/webhooks/{}/{}",
                self.config.callback_base_url,
                app_name.to_lowercase(),
                id
            ),
            verification_token: self.cipher.encrypt(&token).unwrap(),
            config,
        };
        let trigger = TriggerRepo::create(&self.pool, &input).await.unwrap();
        if status != TriggerStatus::Pending {
            TriggerRepo::update_status(&self.pool, id, status, None)
                .await
                .unwrap();
        }
        let trigger = TriggerRepo::find_by_id(&self.pool, id).await.unwrap().unwrap();
        (trigger, token)
    }
}

// ---------------------------------------------------------------------------
// Mock connector
// ---------------------------------------------------------------------------

/// Scriptable connector for orchestrator and scheduler tests. Registered
/// under `GITHUB` so catalog validation passes; results are popped from the
/// queues, falling back to success.
pub struct MockConnector {
    register_results: Mutex<VecDeque<Result<Registration, ConnectorError>>>,
    renew_results: Mutex<VecDeque<Result<Renewal, ConnectorError>>>,
    unregister_results: Mutex<VecDeque<Result<(), ConnectorError>>>,
    pub register_calls: AtomicUsize,
    pub unregister_calls: AtomicUsize,
    pub renew_calls: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            register_results: Mutex::new(VecDeque::new()),
            renew_results: Mutex::new(VecDeque::new()),
            unregister_results: Mutex::new(VecDeque::new()),
            register_calls: AtomicUsize::new(0),
            unregister_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
        }
    }

    pub fn queue_register(&self, result: Result<Registration, ConnectorError>) {
        self.register_results.lock().unwrap().push_back(result);
    }

    pub fn queue_renew(&self, result: Result<Renewal, ConnectorError>) {
        self.renew_results.lock().unwrap().push_back(result);
    }

    pub fn queue_unregister(&self, result: Result<(), ConnectorError>) {
        self.unregister_results.lock().unwrap().push_back(result);
    }

    fn default_registration() -> Registration {
        Registration {
            external_webhook_id: Some("mock-hook-1".to_string()),
            expires_at: None,
            setup_instructions: None,
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn app_name(&self) -> &'static str {
        "GITHUB"
    }

    async fn register(
        &self,
        _ctx: &WebhookContext,
        _account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        self.register_calls.fetch_add(1, Ordering::SeqCst);
        self.register_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_registration()))
    }

    async fn unregister(
        &self,
        _ctx: &WebhookContext,
        _account: &LinkedAccount,
    ) -> Result<(), ConnectorError> {
        self.unregister_calls.fetch_add(1, Ordering::SeqCst);
        self.unregister_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn verify(
        &self,
        _body: &[u8],
        _headers: &axum::http::HeaderMap,
        _ctx: &WebhookContext,
    ) -> Result<(), ConnectorError> {
        Ok(())
    }

    fn parse(
        &self,
        body: &[u8],
        _headers: &axum::http::HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<Vec<ParsedEvent>, ConnectorError> {
        let event_data = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::MalformedPayload(e.to_string()))?;
        Ok(vec![ParsedEvent {
            event_type: ctx.trigger_type.clone(),
            event_data,
            external_event_id: None,
        }])
    }

    async fn renew(
        &self,
        _ctx: &WebhookContext,
        _account: &LinkedAccount,
    ) -> Result<Renewal, ConnectorError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        self.renew_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Renewal {
                    expires_at: Utc::now() + chrono::Duration::days(7),
                })
            })
    }

    fn challenge(&self, _body: &[u8], _headers: &axum::http::HeaderMap) -> Option<ChallengeResponse> {
        None
    }
}

// ---------------------------------------------------------------------------
// Signature helpers
// ---------------------------------------------------------------------------

fn hmac_hex(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

fn hmac_b64(secret: &str, message: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(message);
    STANDARD.encode(mac.finalize().into_bytes())
}

/// `X-Hub-Signature-256` value for a GitHub delivery.
pub fn github_signature(secret: &str, body: &[u8]) -> String {
    format!("sha256={}", hmac_hex(secret, body))
}

/// `(timestamp, signature)` headers for a Slack delivery signed at `ts`.
pub fn slack_signature(ts_secs: i64, body: &[u8]) -> (String, String) {
    let ts = ts_secs.to_string();
    let basestring = format!("v0:{}:{}", ts, String::from_utf8_lossy(body));
    let sig = format!("v0={}", hmac_hex(SLACK_SIGNING_SECRET, basestring.as_bytes()));
    (ts, sig)
}

/// `(timestamp, signature)` headers for a HubSpot v3 delivery.
pub fn hubspot_signature(webhook_url: &str, body: &[u8], ts_millis: i64) -> (String, String) {
    let ts = ts_millis.to_string();
    let message = format!("POST{}{}{}", webhook_url, String::from_utf8_lossy(body), ts);
    let sig = hmac_b64(HUBSPOT_APP_SECRET, message.as_bytes());
    (ts, sig)
}

/// `X-Shopify-Hmac-SHA256` value for a Shopify delivery.
pub fn shopify_signature(body: &[u8]) -> String {
    hmac_b64(SHOPIFY_CLIENT_SECRET, body)
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Collect the response body into a `serde_json::Value`.
pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// POST raw bytes with custom headers.
pub async fn post_bytes(
    app: Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: Vec<u8>,
) -> axum::response::Response {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let request = request.body(Body::from(body)).unwrap();
    tower::ServiceExt::oneshot(app, request).await.unwrap()
}

/// GET from the given URI.
pub async fn get(app: Router, uri: &str) -> axum::response::Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    tower::ServiceExt::oneshot(app, request).await.unwrap()
}
