use std::sync::Arc;

use hookwire_connectors::ConnectorRegistry;
use hookwire_core::account::LinkedAccountStore;
use hookwire_core::secret::TokenCipher;

use crate::config::ServerConfig;
use crate::metrics::MetricsCollector;
use crate::rate_limit::RateLimiter;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: hookwire_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Provider connectors, keyed by app name.
    pub connectors: Arc<ConnectorRegistry>,
    /// Two-tier admission control for the ingestion endpoint.
    pub rate_limiter: Arc<RateLimiter>,
    /// Process-wide metrics collector.
    pub metrics: Arc<MetricsCollector>,
    /// Envelope cipher for verification tokens at rest.
    pub cipher: Arc<TokenCipher>,
    /// Port to the external linked-account store.
    pub accounts: Arc<dyn LinkedAccountStore>,
}
