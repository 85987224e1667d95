//! HubSpot connector: CRM event subscriptions over the Webhooks v3 API.
//!
//! Subscriptions are created per developer app
//! (`POST /webhooks/v3/{appId}/subscriptions`). Deliveries are authenticated
//! with the v3 signature scheme only: base64 HMAC-SHA256 of
//! `method + callback URL + body + timestamp` under the app secret, sent in
//! `X-HubSpot-Signature-V3` with a millisecond `X-HubSpot-Request-Timestamp`.
//! Legacy v1/v2 signatures are rejected outright.
//!
//! HubSpot batches events: one request may carry a JSON array of objects,
//! each with its own `eventId`, all covered by a single signature.

use async_trait::async_trait;
use http::HeaderMap;
use hookwire_core::account::LinkedAccount;
use serde_json::json;

use crate::error::ConnectorError;
use crate::signature::{check_timestamp_skew, verify_hmac_base64};
use crate::types::{ParsedEvent, Registration, WebhookContext};
use crate::Connector;

pub const APP_NAME: &str = "HUBSPOT";

const BASE_URL: &str = "https://api.hubapi.com";

pub struct HubSpotConnector {
    app_id: Option<String>,
    app_secret: Option<String>,
    max_skew_secs: i64,
    http: reqwest::Client,
}

impl HubSpotConnector {
    pub fn new(
        app_id: Option<String>,
        app_secret: Option<String>,
        max_skew_secs: i64,
        http: reqwest::Client,
    ) -> Self {
        Self {
            app_id,
            app_secret,
            max_skew_secs,
            http,
        }
    }

    fn app_id(&self) -> Result<&str, ConnectorError> {
        self.app_id
            .as_deref()
            .ok_or_else(|| ConnectorError::Config("HubSpot app id is not configured".into()))
    }

    fn app_secret(&self) -> Result<&str, ConnectorError> {
        self.app_secret
            .as_deref()
            .ok_or_else(|| ConnectorError::Config("HubSpot app secret is not configured".into()))
    }

    fn subscriptions_url(&self) -> Result<String, ConnectorError> {
        Ok(format!(
            "{BASE_URL}/webhooks/v3/{}/subscriptions",
            self.app_id()?
        ))
    }

    /// Find an existing subscription for the event type, making repeated
    /// registration idempotent.
    async fn find_existing_subscription(
        &self,
        token: &str,
        event_type: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let response = self
            .http
            .get(self.subscriptions_url()?)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::from_status(status, &body));
        }

        let data: serde_json::Value = response.json().await?;
        let results = data
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let existing = results.iter().find(|sub| {
            sub.get("eventType").and_then(|v| v.as_str()) == Some(event_type)
        });
        Ok(existing
            .and_then(|sub| sub.get("id"))
            .map(|id| match id.as_str() {
                Some(s) => s.to_string(),
                None => id.to_string(),
            }))
    }

    /// Parse one object of a HubSpot delivery into an event.
    fn parse_one(payload: &serde_json::Value) -> ParsedEvent {
        let event_type = payload
            .get("eventType")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let event_id = payload.get("eventId").map(|id| match id.as_str() {
            Some(s) => s.to_string(),
            None => id.to_string(),
        });
        ParsedEvent {
            event_type,
            event_data: payload.clone(),
            external_event_id: event_id,
        }
    }
}

#[async_trait]
impl Connector for HubSpotConnector {
    fn app_name(&self) -> &'static str {
        APP_NAME
    }

    async fn register(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        let token = account.oauth_token()?;

        let mut subscription = json!({
            "eventType": ctx.trigger_type,
            "active": true,
        });
        // propertyChange subscriptions must name the watched property.
        if ctx.trigger_type.contains("propertyChange") {
            let property = ctx.config_str("property_name").ok_or_else(|| {
                ConnectorError::Config(format!(
                    "'property_name' is required for {}",
                    ctx.trigger_type
                ))
            })?;
            subscription["propertyName"] = json!(property);
        }

        let response = self
            .http
            .post(self.subscriptions_url()?)
            .bearer_auth(token)
            .json(&subscription)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::CONFLICT {
            if let Some(id) = self
                .find_existing_subscription(token, &ctx.trigger_type)
                .await?
            {
                tracing::info!(
                    trigger_id = %ctx.trigger_id,
                    subscription_id = %id,
                    "HubSpot subscription already exists, reusing"
                );
                return Ok(Registration {
                    external_webhook_id: Some(id),
                    ..Registration::default()
                });
            }
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::from_status(status, &body));
        }

        let created: serde_json::Value = response.json().await?;
        let subscription_id = created
            .get("id")
            .map(|id| match id.as_str() {
                Some(s) => s.to_string(),
                None => id.to_string(),
            })
            .ok_or_else(|| {
                ConnectorError::Permanent("HubSpot returned no subscription id".into())
            })?;

        tracing::info!(
            trigger_id = %ctx.trigger_id,
            subscription_id = %subscription_id,
            event_type = %ctx.trigger_type,
            "HubSpot subscription registered"
        );

        Ok(Registration {
            external_webhook_id: Some(subscription_id),
            ..Registration::default()
        })
    }

    async fn unregister(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<(), ConnectorError> {
        let Some(subscription_id) = &ctx.external_webhook_id else {
            return Ok(());
        };
        let token = account.oauth_token()?;

        let response = self
            .http
            .delete(format!("{}/{}", self.subscriptions_url()?, subscription_id))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ConnectorError::from_status(status, &body))
    }

    fn verify(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<(), ConnectorError> {
        let Some(signature) = headers
            .get("X-HubSpot-Signature-V3")
            .and_then(|v| v.to_str().ok())
        else {
            // A v1/v2 header without v3 means an unsupported scheme, not a
            // missing one.
            if headers.contains_key("X-HubSpot-Signature") {
                return Err(ConnectorError::InvalidSignature);
            }
            return Err(ConnectorError::MissingHeader("X-HubSpot-Signature-V3"));
        };

        let timestamp = headers
            .get("X-HubSpot-Request-Timestamp")
            .and_then(|v| v.to_str().ok())
            .ok_or(ConnectorError::MissingHeader("X-HubSpot-Request-Timestamp"))?;

        // Millisecond timestamp; replay window checked in seconds.
        let ts_millis: i64 = timestamp
            .parse()
            .map_err(|_| ConnectorError::InvalidSignature)?;
        check_timestamp_skew(ts_millis / 1000, self.max_skew_secs)?;

        let secret = self.app_secret()?;

        // Signature source: method + callback URL + raw body + timestamp.
        let mut message =
            Vec::with_capacity(4 + ctx.webhook_url.len() + body.len() + timestamp.len());
        message.extend_from_slice(b"POST");
        message.extend_from_slice(ctx.webhook_url.as_bytes());
        message.extend_from_slice(body);
        message.extend_from_slice(timestamp.as_bytes());

        if !verify_hmac_base64(secret.as_bytes(), &message, signature) {
            return Err(ConnectorError::InvalidSignature);
        }
        Ok(())
    }

    fn parse(
        &self,
        body: &[u8],
        _headers: &HeaderMap,
        _ctx: &WebhookContext,
    ) -> Result<Vec<ParsedEvent>, ConnectorError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::MalformedPayload(e.to_string()))?;

        match payload {
            serde_json::Value::Array(items) => {
                if items.is_empty() {
                    return Err(ConnectorError::MalformedPayload(
                        "empty event batch".into(),
                    ));
                }
                Ok(items.iter().map(Self::parse_one).collect())
            }
            object @ serde_json::Value::Object(_) => Ok(vec![Self::parse_one(&object)]),
            other => Err(ConnectorError::MalformedPayload(format!(
                "expected object or array, got {other}"
            ))),
        }
    }
}
