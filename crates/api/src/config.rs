use hookwire_connectors::ConnectorSettings;

use crate::rate_limit::RateSettings;

/// Server configuration loaded from environment variables.
///
/// All fields except `TOKEN_KEY` have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Public base URL embedded into trigger callback URLs
    /// (default: `http://localhost:3000`).
    pub callback_base_url: String,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Per-source-IP admission bucket (default: capacity 200, 100/s).
    pub global_rate: RateSettings,
    /// Per-trigger admission bucket (default: capacity 20, 10/s).
    pub trigger_rate: RateSettings,
    /// Event retention in days (default: `30`).
    pub event_retention_days: i64,
    /// Base64 32-byte key for the verification-token envelope. Required.
    pub token_key: String,
    /// Provider secrets and the replay-skew window.
    pub connectors: ConnectorSettings,
    /// Background task cadences.
    pub scheduler: SchedulerConfig,
}

/// Cadences for the background scheduler tasks, in seconds.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Subscription renewal sweep (default: 6 hours).
    pub renewal_interval_secs: u64,
    /// Expired-trigger sweep (default: 1 hour).
    pub expiry_interval_secs: u64,
    /// Failed-registration retry sweep (default: 30 minutes).
    pub retry_interval_secs: u64,
    /// Event retention cleanup (default: 24 hours).
    pub cleanup_interval_secs: u64,
    /// Metrics gauge refresh (default: 60 seconds).
    pub gauge_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                  |
    /// |--------------------------|--------------------------|
    /// | `HOST`                   | `0.0.0.0`                |
    /// | `PORT`                   | `3000`                   |
    /// | `CALLBACK_BASE_URL`      | `http://localhost:3000`  |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                     |
    /// | `GLOBAL_RATE_CAPACITY`   | `200`                    |
    /// | `GLOBAL_RATE_REFILL`     | `100`                    |
    /// | `TRIGGER_RATE_CAPACITY`  | `20`                     |
    /// | `TRIGGER_RATE_REFILL`    | `10`                     |
    /// | `EVENT_RETENTION_DAYS`   | `30`                     |
    /// | `TOKEN_KEY`              | **required**             |
    /// | `REPLAY_SKEW_SECS`       | `300`                    |
    ///
    /// Provider secrets (`HUBSPOT_APP_ID`, `HUBSPOT_APP_SECRET`,
    /// `SHOPIFY_CLIENT_SECRET`, `SLACK_SIGNING_SECRET`, `GMAIL_PUBSUB_TOPIC`,
    /// `GMAIL_PUSH_AUDIENCE`, `GMAIL_OIDC_PUBLIC_KEY`) are optional; a
    /// provider without its secret rejects traffic with a config error.
    ///
    /// # Panics
    ///
    /// Panics if `TOKEN_KEY` is unset or a numeric variable fails to parse,
    /// so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = env_parsed("PORT", 3000);
        let callback_base_url = std::env::var("CALLBACK_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into());
        let request_timeout_secs: u64 = env_parsed("REQUEST_TIMEOUT_SECS", 30);

        let global_rate = RateSettings {
            capacity: env_parsed("GLOBAL_RATE_CAPACITY", 200.0),
            refill_per_sec: env_parsed("GLOBAL_RATE_REFILL", 100.0),
        };
        let trigger_rate = RateSettings {
            capacity: env_parsed("TRIGGER_RATE_CAPACITY", 20.0),
            refill_per_sec: env_parsed("TRIGGER_RATE_REFILL", 10.0),
        };

        let event_retention_days: i64 = env_parsed("EVENT_RETENTION_DAYS", 30);

        let token_key =
            std::env::var("TOKEN_KEY").expect("TOKEN_KEY must be set in the environment");
        assert!(!token_key.is_empty(), "TOKEN_KEY must not be empty");

        let connectors = ConnectorSettings {
            replay_skew_secs: env_parsed("REPLAY_SKEW_SECS", 300),
            hubspot_app_id: std::env::var("HUBSPOT_APP_ID").ok(),
            hubspot_app_secret: std::env::var("HUBSPOT_APP_SECRET").ok(),
            shopify_client_secret: std::env::var("SHOPIFY_CLIENT_SECRET").ok(),
            slack_signing_secret: std::env::var("SLACK_SIGNING_SECRET").ok(),
            gmail_pubsub_topic: std::env::var("GMAIL_PUBSUB_TOPIC").ok(),
            gmail_push_audience: std::env::var("GMAIL_PUSH_AUDIENCE").ok(),
            gmail_oidc_public_key_pem: std::env::var("GMAIL_OIDC_PUBLIC_KEY").ok(),
        };

        let scheduler = SchedulerConfig {
            renewal_interval_secs: env_parsed("RENEWAL_INTERVAL_SECS", 6 * 3600),
            expiry_interval_secs: env_parsed("EXPIRY_INTERVAL_SECS", 3600),
            retry_interval_secs: env_parsed("RETRY_INTERVAL_SECS", 30 * 60),
            cleanup_interval_secs: env_parsed("CLEANUP_INTERVAL_SECS", 24 * 3600),
            gauge_interval_secs: env_parsed("GAUGE_INTERVAL_SECS", 60),
        };

        Self {
            host,
            port,
            callback_base_url,
            request_timeout_secs,
            global_rate,
            trigger_rate,
            event_retention_days,
            token_key,
            connectors,
            scheduler,
        }
    }
}

/// Parse an environment variable, falling back to a default when unset.
fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{name} must be valid: {e}")),
        Err(_) => default,
    }
}
