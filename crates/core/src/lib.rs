//! Shared domain types for the Hookwire webhook trigger platform.
//!
//! This crate has no knowledge of HTTP or the database; it provides the
//! building blocks every other crate consumes:
//!
//! - [`error::CoreError`] — the domain error taxonomy.
//! - [`types`] — id and timestamp aliases.
//! - [`account`] — the linked-account credential port.
//! - [`token`] — verification-token generation.
//! - [`secret::TokenCipher`] — envelope encryption for tokens at rest.

pub mod account;
pub mod error;
pub mod secret;
pub mod token;
pub mod types;

pub use account::{Credentials, LinkedAccount, LinkedAccountStore};
pub use error::CoreError;
pub use secret::TokenCipher;
pub use types::{Id, Timestamp};
