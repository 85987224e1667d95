//! Gmail connector: mailbox push notifications over Google Pub/Sub.
//!
//! `register` issues a `users/me/watch` call binding the mailbox to the
//! configured Pub/Sub topic; watches expire after roughly seven days and are
//! re-issued by `renew`. Pub/Sub pushes an envelope whose `message.data` is
//! base64 JSON `{emailAddress, historyId}`; the `messageId` of the envelope
//! is the dedup key.
//!
//! Authenticity comes from the OIDC bearer token Google attaches to each
//! push: an RS256 JWT whose audience must equal the configured push endpoint
//! and whose issuer must be Google. The verifying public key is supplied via
//! configuration so the hot path never fetches JWKS.

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use http::HeaderMap;
use hookwire_core::account::LinkedAccount;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::json;

use crate::error::ConnectorError;
use crate::types::{ParsedEvent, Registration, Renewal, WebhookContext};
use crate::Connector;

pub const APP_NAME: &str = "GMAIL";

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// Claims we read from the Pub/Sub OIDC token. Audience/issuer/expiry are
/// enforced by the validation itself.
#[derive(Debug, Deserialize)]
struct PushTokenClaims {
    #[allow(dead_code)]
    email: Option<String>,
}

pub struct GmailConnector {
    pubsub_topic: Option<String>,
    push_audience: Option<String>,
    decoding_key: Option<DecodingKey>,
    http: reqwest::Client,
}

impl GmailConnector {
    pub fn new(
        pubsub_topic: Option<String>,
        push_audience: Option<String>,
        oidc_public_key_pem: Option<&str>,
        http: reqwest::Client,
    ) -> Self {
        let decoding_key = oidc_public_key_pem.and_then(|pem| {
            match DecodingKey::from_rsa_pem(pem.as_bytes()) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid Gmail OIDC public key, verification disabled");
                    None
                }
            }
        });
        Self {
            pubsub_topic,
            push_audience,
            decoding_key,
            http,
        }
    }

    fn pubsub_topic(&self) -> Result<&str, ConnectorError> {
        self.pubsub_topic.as_deref().ok_or_else(|| {
            ConnectorError::Config("Gmail Pub/Sub topic is not configured".into())
        })
    }

    /// Gmail label ids to watch for a trigger type.
    fn label_ids_for(trigger_type: &str) -> Vec<&'static str> {
        match trigger_type {
            "message.sent" => vec!["SENT"],
            "label.added" => vec!["INBOX", "STARRED", "IMPORTANT"],
            _ => vec!["INBOX"],
        }
    }

    /// Issue a `users/me/watch` call and return the provider expiry.
    async fn watch(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        let token = account.oauth_token()?;
        let request = json!({
            "topicName": self.pubsub_topic()?,
            "labelIds": Self::label_ids_for(&ctx.trigger_type),
            "labelFilterBehavior": "INCLUDE",
        });

        let response = self
            .http
            .post(format!("{GMAIL_API_BASE}/users/me/watch"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::from_status(status, &body));
        }

        let data: serde_json::Value = response.json().await?;
        let history_id = data
            .get("historyId")
            .map(|id| match id.as_str() {
                Some(s) => s.to_string(),
                None => id.to_string(),
            })
            .ok_or_else(|| ConnectorError::Permanent("Gmail watch returned no historyId".into()))?;

        // Expiration arrives as epoch milliseconds in a string.
        let expires_at = data
            .get("expiration")
            .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        tracing::info!(
            trigger_id = %ctx.trigger_id,
            history_id = %history_id,
            expires_at = ?expires_at,
            "Gmail watch registered"
        );

        Ok(Registration {
            external_webhook_id: Some(history_id),
            expires_at,
            setup_instructions: None,
        })
    }

    /// Read the `exp` claim without validating, to report how stale an
    /// expired push token is.
    fn token_age_secs(token: &str) -> i64 {
        let Some(payload) = token.split('.').nth(1) else {
            return 0;
        };
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload) else {
            return 0;
        };
        let Ok(claims) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            return 0;
        };
        claims
            .get("exp")
            .and_then(|v| v.as_i64())
            .map(|exp| (Utc::now().timestamp() - exp).max(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Connector for GmailConnector {
    fn app_name(&self) -> &'static str {
        APP_NAME
    }

    async fn register(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        self.watch(ctx, account).await
    }

    async fn unregister(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<(), ConnectorError> {
        let token = account.oauth_token()?;
        let response = self
            .http
            .post(format!("{GMAIL_API_BASE}/users/me/stop"))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        // 404 means the watch is already gone.
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            tracing::info!(trigger_id = %ctx.trigger_id, "Gmail watch stopped");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConnectorError::from_status(status, &body))
    }

    fn verify(
        &self,
        _body: &[u8],
        headers: &HeaderMap,
        _ctx: &WebhookContext,
    ) -> Result<(), ConnectorError> {
        let authorization = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(ConnectorError::MissingHeader("Authorization"))?;
        let token = authorization
            .strip_prefix("Bearer ")
            .ok_or(ConnectorError::InvalidSignature)?;

        let key = self.decoding_key.as_ref().ok_or_else(|| {
            ConnectorError::Config("Gmail OIDC public key is not configured".into())
        })?;
        let audience = self.push_audience.as_deref().ok_or_else(|| {
            ConnectorError::Config("Gmail push audience is not configured".into())
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[audience]);
        validation.set_issuer(&GOOGLE_ISSUERS);

        decode::<PushTokenClaims>(token, key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => ConnectorError::StaleTimestamp {
                age_secs: Self::token_age_secs(token),
                max_secs: 0,
            },
            _ => ConnectorError::InvalidSignature,
        })?;
        Ok(())
    }

    fn parse(
        &self,
        body: &[u8],
        _headers: &HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<Vec<ParsedEvent>, ConnectorError> {
        let envelope: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::MalformedPayload(e.to_string()))?;

        let message = envelope
            .get("message")
            .ok_or_else(|| ConnectorError::MalformedPayload("missing Pub/Sub message".into()))?;

        let message_id = message
            .get("messageId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ConnectorError::MalformedPayload("missing messageId".into()))?
            .to_string();

        // message.data is base64 JSON: {"emailAddress": ..., "historyId": ...}
        let notification = message
            .get("data")
            .and_then(|v| v.as_str())
            .map(|data| {
                let bytes = STANDARD
                    .decode(data)
                    .map_err(|e| ConnectorError::MalformedPayload(format!("bad base64 data: {e}")))?;
                serde_json::from_slice::<serde_json::Value>(&bytes)
                    .map_err(|e| ConnectorError::MalformedPayload(format!("bad data JSON: {e}")))
            })
            .transpose()?
            .unwrap_or_else(|| json!({}));

        let event_data = json!({
            "email_address": notification.get("emailAddress"),
            "history_id": notification.get("historyId"),
            "message_id": message_id,
            "publish_time": message.get("publishTime"),
        });

        Ok(vec![ParsedEvent {
            event_type: ctx.trigger_type.clone(),
            event_data,
            external_event_id: Some(message_id),
        }])
    }

    async fn renew(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Renewal, ConnectorError> {
        let registration = self.watch(ctx, account).await?;
        let expires_at = registration.expires_at.ok_or_else(|| {
            ConnectorError::Permanent("Gmail watch renewal returned no expiration".into())
        })?;
        Ok(Renewal { expires_at })
    }
}
