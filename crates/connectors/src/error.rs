//! Connector error taxonomy.
//!
//! Verification failures (`InvalidSignature`, `StaleTimestamp`,
//! `MissingHeader`) are handled locally at the ingestion endpoint; provider
//! call failures are split into `Transient` (retried by the orchestrator and
//! scheduler) and `Permanent` (surfaced to the caller, trigger left in error
//! state).

use hookwire_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Signature did not match, or an unsupported signature scheme was used.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// Provider timestamp outside the replay window despite a valid format.
    #[error("stale webhook timestamp: {age_secs}s old, window is {max_secs}s")]
    StaleTimestamp { age_secs: i64, max_secs: i64 },

    /// A header the provider always sends is absent.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// The body could not be decoded into the provider's event shape.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The provider has no programmatic API for this operation.
    #[error("operation not supported by this provider")]
    NotSupported,

    /// The connector is missing configuration (app secret, topic, ...).
    #[error("connector misconfigured: {0}")]
    Config(String),

    /// Provider call failed in a way worth retrying (5xx, 429, network).
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Provider call failed in a way that will not succeed on retry.
    #[error("permanent provider error: {0}")]
    Permanent(String),
}

impl ConnectorError {
    /// Whether the orchestrator/scheduler should retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectorError::Transient(_))
    }

    /// Whether this error is a verification rejection (HTTP 401 at ingest).
    pub fn is_verification_failure(&self) -> bool {
        matches!(
            self,
            ConnectorError::InvalidSignature
                | ConnectorError::StaleTimestamp { .. }
                | ConnectorError::MissingHeader(_)
        )
    }

    /// Classify a non-2xx provider response: 429 and 5xx are transient,
    /// everything else is permanent.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {status}: {body}");
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ConnectorError::Transient(message)
        } else {
            ConnectorError::Permanent(message)
        }
    }
}

impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        // Network failures, timeouts, and body decode errors are retryable.
        ConnectorError::Transient(err.to_string())
    }
}

impl From<CoreError> for ConnectorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Credentials(msg) => ConnectorError::Config(msg),
            other => ConnectorError::Permanent(other.to_string()),
        }
    }
}
