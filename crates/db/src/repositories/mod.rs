//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod trigger_event_repo;
pub mod trigger_repo;

pub use trigger_event_repo::TriggerEventRepo;
pub use trigger_repo::TriggerRepo;
