//! Provider connectors for the Hookwire webhook trigger platform.
//!
//! A [`Connector`] encapsulates one provider's webhook idiosyncrasies behind
//! a uniform capability set: register, unregister, verify, parse, renew, and
//! (where the provider uses one) a URL-verification challenge. Connectors are
//! looked up by app name through the [`ConnectorRegistry`] built once at
//! startup.
//!
//! Credentials are never captured at construction: `register`, `unregister`,
//! and `renew` receive the resolved [`LinkedAccount`] per call, so refreshed
//! tokens are picked up transparently. `verify` and `parse` are synchronous
//! pure functions over the raw body bytes and headers — the ingestion hot
//! path never performs outbound I/O.

use async_trait::async_trait;
use hookwire_core::account::LinkedAccount;
use http::HeaderMap;

pub mod catalog;
pub mod error;
pub mod github;
pub mod gmail;
pub mod hubspot;
pub mod registry;
pub mod shopify;
pub mod signature;
pub mod slack;
pub mod types;

pub use error::ConnectorError;
pub use registry::{ConnectorRegistry, ConnectorSettings};
pub use types::{ChallengeResponse, ParsedEvent, Registration, Renewal, WebhookContext};

/// Provider capability set.
///
/// Implementations must be idempotent on `register` (a second registration
/// for the same callback URL must not create a duplicate remote subscription)
/// and tolerant of "not found" on `unregister`.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Upper-cased app name this connector serves (e.g. `"SHOPIFY"`).
    fn app_name(&self) -> &'static str;

    /// Create the remote webhook subscription for a trigger.
    async fn register(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError>;

    /// Remove the remote webhook subscription. "Not found" counts as success.
    async fn unregister(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<(), ConnectorError>;

    /// Authenticate an inbound delivery from the raw body and headers.
    ///
    /// Implementations use constant-time comparison and reject provider
    /// timestamps outside the replay window.
    fn verify(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<(), ConnectorError>;

    /// Extract the events carried by a verified delivery.
    ///
    /// Most providers deliver one event per request; HubSpot batches several
    /// in a JSON array, hence the vector.
    fn parse(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<Vec<ParsedEvent>, ConnectorError>;

    /// Extend an expiring subscription. Providers without expiring
    /// subscriptions return [`ConnectorError::NotSupported`], which callers
    /// treat as a no-op.
    async fn renew(
        &self,
        _ctx: &WebhookContext,
        _account: &LinkedAccount,
    ) -> Result<Renewal, ConnectorError> {
        Err(ConnectorError::NotSupported)
    }

    /// Recognise a provider URL-verification challenge in the request body
    /// and produce its response. Returns `None` for ordinary deliveries.
    fn challenge(&self, _body: &[u8], _headers: &HeaderMap) -> Option<ChallengeResponse> {
        None
    }
}
