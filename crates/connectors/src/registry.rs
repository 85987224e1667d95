//! Static connector registry.
//!
//! Built once at startup from [`ConnectorSettings`]; lookups are plain map
//! reads keyed by upper-cased app name. Connectors for providers whose
//! secrets are absent are still registered — their operations fail with a
//! configuration error, which keeps misconfiguration visible instead of
//! looking like an unknown app.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::github::GitHubConnector;
use crate::gmail::GmailConnector;
use crate::hubspot::HubSpotConnector;
use crate::shopify::ShopifyConnector;
use crate::slack::SlackConnector;
use crate::Connector;

/// Per-provider timeout for outbound calls.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// User-Agent sent on every outbound provider request.
const USER_AGENT: &str = concat!("hookwire/", env!("CARGO_PKG_VERSION"));

/// Default replay window for provider-signed timestamps.
pub const DEFAULT_REPLAY_SKEW_SECS: i64 = 300;

/// Provider secrets and knobs the registry needs at construction.
#[derive(Debug, Clone, Default)]
pub struct ConnectorSettings {
    /// Maximum tolerated age of a provider-signed timestamp, in seconds.
    pub replay_skew_secs: i64,
    pub hubspot_app_id: Option<String>,
    pub hubspot_app_secret: Option<String>,
    pub shopify_client_secret: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub gmail_pubsub_topic: Option<String>,
    pub gmail_push_audience: Option<String>,
    /// PEM-encoded RSA public key for the Pub/Sub OIDC token.
    pub gmail_oidc_public_key_pem: Option<String>,
}

impl ConnectorSettings {
    fn skew(&self) -> i64 {
        if self.replay_skew_secs > 0 {
            self.replay_skew_secs
        } else {
            DEFAULT_REPLAY_SKEW_SECS
        }
    }
}

/// App-name-keyed map of connectors.
pub struct ConnectorRegistry {
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    /// An empty registry; connectors are added with [`insert`](Self::insert).
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Build the registry with all supported providers.
    pub fn with_defaults(settings: &ConnectorSettings) -> Self {
        let http = build_http_client();
        let skew = settings.skew();

        let mut registry = Self::new();
        registry.insert(Arc::new(HubSpotConnector::new(
            settings.hubspot_app_id.clone(),
            settings.hubspot_app_secret.clone(),
            skew,
            http.clone(),
        )));
        registry.insert(Arc::new(ShopifyConnector::new(
            settings.shopify_client_secret.clone(),
            http.clone(),
        )));
        registry.insert(Arc::new(SlackConnector::new(
            settings.slack_signing_secret.clone(),
            skew,
        )));
        registry.insert(Arc::new(GitHubConnector::new(http.clone())));
        registry.insert(Arc::new(GmailConnector::new(
            settings.gmail_pubsub_topic.clone(),
            settings.gmail_push_audience.clone(),
            settings.gmail_oidc_public_key_pem.as_deref(),
            http,
        )));
        registry
    }

    /// Register (or replace) a connector under its app name.
    pub fn insert(&mut self, connector: Arc<dyn Connector>) {
        self.connectors.insert(connector.app_name(), connector);
    }

    /// Look up a connector by app name, case-insensitively.
    pub fn get(&self, app_name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors
            .get(app_name.to_uppercase().as_str())
            .cloned()
    }

    /// Names of all registered apps.
    pub fn app_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.connectors.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared HTTP client for all provider calls.
fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .expect("Failed to build provider HTTP client")
}
