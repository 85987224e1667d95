//! Shared response envelope types for API handlers.

use hookwire_core::types::Id;
use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Acknowledgement returned to providers from the ingestion endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    /// `"ok"`, `"duplicate"`, or `"challenge"`.
    pub status: &'static str,
    /// Events newly stored by this delivery.
    pub received: usize,
    /// Events suppressed as duplicates of earlier deliveries.
    pub duplicates: usize,
    /// Ids of all event rows matching this delivery (stored or pre-existing).
    pub event_ids: Vec<Id>,
}
