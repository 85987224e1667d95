//! Trigger event entity model and DTOs.

use hookwire_core::types::{Id, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Processing state of a received webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "trigger_event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TriggerEventStatus {
    Pending,
    Delivered,
    Failed,
    Expired,
}

/// A row from the `trigger_events` table: one received webhook delivery.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TriggerEvent {
    pub id: Id,
    pub trigger_id: Id,
    pub event_type: String,
    pub event_data: serde_json::Value,
    /// Provider-supplied delivery id; the dedup key together with
    /// `trigger_id` when present.
    pub external_event_id: Option<String>,
    pub status: TriggerEventStatus,
    pub error_message: Option<String>,
    pub received_at: Timestamp,
    pub processed_at: Option<Timestamp>,
    pub delivered_at: Option<Timestamp>,
    pub expires_at: Timestamp,
}

/// DTO for inserting a new trigger event.
#[derive(Debug, Clone)]
pub struct NewTriggerEvent {
    pub trigger_id: Id,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub external_event_id: Option<String>,
    pub expires_at: Timestamp,
}
