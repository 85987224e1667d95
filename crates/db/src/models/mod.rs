//! Entity models and DTOs.

pub mod trigger;
pub mod trigger_event;

pub use trigger::{NewTrigger, Trigger, TriggerStatus};
pub use trigger_event::{NewTriggerEvent, TriggerEvent, TriggerEventStatus};
