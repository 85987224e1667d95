//! HTTP route definitions.
//!
//! The public surface is intentionally small: the webhook receiver (the hot
//! path providers call), the health check, and the metrics exposition
//! endpoint. Trigger administration goes through the orchestrator, consumed
//! by the platform's admin layer.

pub mod health;
pub mod metrics;
pub mod webhooks;
