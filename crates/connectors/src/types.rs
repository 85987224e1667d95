//! Data structures exchanged between the platform and its connectors.

use hookwire_core::types::{Id, Timestamp};
use serde::Serialize;

/// Trigger view handed to connectors.
///
/// Deliberately not the database row: the verification token arrives here
/// already decrypted, and connectors stay independent of the storage layer.
#[derive(Debug, Clone)]
pub struct WebhookContext {
    pub trigger_id: Id,
    /// Upper-cased app name (e.g. `"GITHUB"`).
    pub app_name: String,
    /// Provider-specific event name (e.g. `"push"`, `"orders/create"`).
    pub trigger_type: String,
    /// The callback URL this platform exposes for the trigger. Also the
    /// exact URI signed by providers that include it (HubSpot).
    pub webhook_url: String,
    pub external_webhook_id: Option<String>,
    /// Filter and per-provider settings (e.g. GitHub `owner`/`repo`).
    pub config: serde_json::Value,
    /// Decrypted verification token shared with the provider.
    pub verification_token: String,
}

impl WebhookContext {
    /// Read a string value from the config map.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Outcome of a successful webhook registration.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    /// Subscription id assigned by the provider; absent when the provider
    /// has no per-subscription identity (Slack Events API).
    pub external_webhook_id: Option<String>,
    /// When the remote subscription expires, for providers that expire.
    pub expires_at: Option<Timestamp>,
    /// Human instructions when the provider requires manual configuration.
    pub setup_instructions: Option<String>,
}

/// Outcome of a successful subscription renewal.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub expires_at: Timestamp,
}

/// One event extracted from a verified delivery.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub event_type: String,
    pub event_data: serde_json::Value,
    /// Provider-supplied delivery id; the dedup key when present.
    pub external_event_id: Option<String>,
}

/// Response to a provider URL-verification challenge.
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeResponse {
    #[serde(flatten)]
    pub body: serde_json::Value,
}

impl ChallengeResponse {
    pub fn new(body: serde_json::Value) -> Self {
        Self { body }
    }
}
