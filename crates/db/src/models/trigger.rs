//! Trigger entity model and DTOs.

use hookwire_core::types::{Id, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle state of a webhook subscription.
///
/// `Pending` exists only between row insertion and the first registration
/// outcome. Only the orchestrator and the background scheduler write status
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trigger_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TriggerStatus {
    Pending,
    Active,
    Paused,
    Error,
    Expired,
}

impl TriggerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerStatus::Pending => "pending",
            TriggerStatus::Active => "active",
            TriggerStatus::Paused => "paused",
            TriggerStatus::Error => "error",
            TriggerStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Trigger
// ---------------------------------------------------------------------------

/// A row from the `triggers` table.
///
/// **Note:** `verification_token` holds the encrypted envelope and is never
/// serialized to responses.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trigger {
    pub id: Id,
    pub project_id: Id,
    /// Upper-cased provider app name (e.g. `"HUBSPOT"`).
    pub app_name: String,
    pub linked_account_id: Id,
    pub trigger_name: String,
    /// Provider-specific event name (e.g. `"contact.creation"`, `"push"`).
    pub trigger_type: String,
    pub description: Option<String>,
    /// The callback URL this platform exposes for the trigger.
    pub webhook_url: String,
    /// Subscription id returned by the provider, once registered.
    pub external_webhook_id: Option<String>,
    #[serde(skip_serializing)]
    pub verification_token: Vec<u8>,
    /// Free-form filter and per-provider settings.
    pub config: serde_json::Value,
    pub status: TriggerStatus,
    pub last_error: Option<String>,
    pub last_triggered_at: Option<Timestamp>,
    /// Set for providers whose subscriptions expire (e.g. Gmail watches).
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Trigger {
    /// Read an integer counter from the config map (e.g. `retry_count`).
    pub fn config_counter(&self, key: &str) -> i64 {
        self.config.get(key).and_then(|v| v.as_i64()).unwrap_or(0)
    }
}

/// DTO for inserting a new trigger row.
#[derive(Debug, Clone)]
pub struct NewTrigger {
    pub id: Id,
    pub project_id: Id,
    pub app_name: String,
    pub linked_account_id: Id,
    pub trigger_name: String,
    pub trigger_type: String,
    pub description: Option<String>,
    pub webhook_url: String,
    /// Encrypted verification-token envelope.
    pub verification_token: Vec<u8>,
    pub config: serde_json::Value,
}
