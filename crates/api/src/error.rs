use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use hookwire_connectors::ConnectorError;
use hookwire_core::error::CoreError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and [`ConnectorError`] for provider
/// failures, and adds HTTP-specific variants. Implements [`IntoResponse`] to
/// produce consistent JSON error responses with the status codes the
/// ingestion contract requires (401 signature, 404 unknown, 410 paused,
/// 429 rate-limited with `Retry-After`).
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `hookwire_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A provider connector error (verification, parse, or provider call).
    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The trigger exists but is not accepting deliveries.
    #[error("Gone: {0}")]
    Gone(String),

    /// Admission control rejected the request.
    #[error("Rate limited ({scope})")]
    RateLimited {
        scope: &'static str,
        retry_after_secs: u64,
    },

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Rate limiting carries an extra header, handled separately.
        if let AppError::RateLimited {
            scope,
            retry_after_secs,
        } = &self
        {
            let body = json!({
                "error": format!("Rate limit exceeded ({scope})"),
                "code": "RATE_LIMITED",
            });
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                axum::Json(body),
            )
                .into_response();
        }

        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Credentials(msg) => {
                    (StatusCode::BAD_REQUEST, "CREDENTIALS_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::Connector(err) => classify_connector_error(err),

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Gone(reason) => (StatusCode::GONE, "GONE", reason.clone()),
            AppError::RateLimited { .. } => unreachable!("handled above"),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (error code 23505) map to 409.
/// - Everything else maps to 500 with a sanitized message; the provider will
///   retry per its own policy.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                return (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                );
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

/// Map connector errors onto the ingestion status codes: verification
/// failures are 401, malformed payloads 400, provider call failures 502,
/// connector misconfiguration 500.
fn classify_connector_error(err: &ConnectorError) -> (StatusCode, &'static str, String) {
    match err {
        ConnectorError::InvalidSignature
        | ConnectorError::StaleTimestamp { .. }
        | ConnectorError::MissingHeader(_) => (
            StatusCode::UNAUTHORIZED,
            "VERIFICATION_FAILED",
            err.to_string(),
        ),
        ConnectorError::MalformedPayload(msg) => (
            StatusCode::BAD_REQUEST,
            "MALFORMED_PAYLOAD",
            msg.clone(),
        ),
        ConnectorError::NotSupported => (
            StatusCode::BAD_REQUEST,
            "NOT_SUPPORTED",
            err.to_string(),
        ),
        ConnectorError::Config(msg) => {
            tracing::error!(error = %msg, "Connector misconfigured");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONNECTOR_MISCONFIGURED",
                "Provider connector is misconfigured".to_string(),
            )
        }
        ConnectorError::Transient(msg) | ConnectorError::Permanent(msg) => {
            tracing::error!(error = %msg, "Provider call failed");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                "Provider call failed".to_string(),
            )
        }
    }
}
