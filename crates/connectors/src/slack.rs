//! Slack connector: Events API deliveries.
//!
//! Slack event subscriptions are configured at the app level in the Slack
//! admin UI — there is no programmatic subscription API — so `register`
//! succeeds with setup instructions instead of calling out. Deliveries are
//! authenticated with the workspace signing secret: `v0=<hex HMAC>` over
//! `v0:<timestamp>:<body>`, with a replay window on the timestamp. The first
//! request to a fresh URL is a `url_verification` challenge whose `challenge`
//! value must be echoed back.

use async_trait::async_trait;
use http::HeaderMap;
use hookwire_core::account::LinkedAccount;
use serde_json::json;

use crate::error::ConnectorError;
use crate::signature::{check_timestamp_skew, verify_hmac_hex};
use crate::types::{ChallengeResponse, ParsedEvent, Registration, WebhookContext};
use crate::Connector;

pub const APP_NAME: &str = "SLACK";

pub struct SlackConnector {
    signing_secret: Option<String>,
    max_skew_secs: i64,
}

impl SlackConnector {
    pub fn new(signing_secret: Option<String>, max_skew_secs: i64) -> Self {
        Self {
            signing_secret,
            max_skew_secs,
        }
    }

    fn signing_secret(&self) -> Result<&str, ConnectorError> {
        self.signing_secret
            .as_deref()
            .ok_or_else(|| ConnectorError::Config("Slack signing secret is not configured".into()))
    }
}

#[async_trait]
impl Connector for SlackConnector {
    fn app_name(&self) -> &'static str {
        APP_NAME
    }

    async fn register(
        &self,
        ctx: &WebhookContext,
        _account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        tracing::info!(
            trigger_id = %ctx.trigger_id,
            trigger_type = %ctx.trigger_type,
            "Slack Events API requires manual subscription setup"
        );
        Ok(Registration {
            external_webhook_id: None,
            expires_at: None,
            setup_instructions: Some(format!(
                "Add this URL as the Events API request URL in your Slack app \
                 settings (Event Subscriptions), then subscribe to '{}': {}",
                ctx.trigger_type, ctx.webhook_url
            )),
        })
    }

    async fn unregister(
        &self,
        ctx: &WebhookContext,
        _account: &LinkedAccount,
    ) -> Result<(), ConnectorError> {
        // Removal is a manual step in the Slack app UI.
        tracing::info!(
            trigger_id = %ctx.trigger_id,
            "Slack Events API subscription must be removed in the app settings"
        );
        Ok(())
    }

    fn verify(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        _ctx: &WebhookContext,
    ) -> Result<(), ConnectorError> {
        let signature = headers
            .get("X-Slack-Signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(ConnectorError::MissingHeader("X-Slack-Signature"))?;
        let timestamp = headers
            .get("X-Slack-Request-Timestamp")
            .and_then(|v| v.to_str().ok())
            .ok_or(ConnectorError::MissingHeader("X-Slack-Request-Timestamp"))?;

        let ts_secs: i64 = timestamp
            .parse()
            .map_err(|_| ConnectorError::InvalidSignature)?;
        check_timestamp_skew(ts_secs, self.max_skew_secs)?;

        let hex_sig = signature
            .strip_prefix("v0=")
            .ok_or(ConnectorError::InvalidSignature)?;

        let secret = self.signing_secret()?;
        let mut basestring = Vec::with_capacity(body.len() + timestamp.len() + 4);
        basestring.extend_from_slice(b"v0:");
        basestring.extend_from_slice(timestamp.as_bytes());
        basestring.extend_from_slice(b":");
        basestring.extend_from_slice(body);

        if !verify_hmac_hex(secret.as_bytes(), &basestring, hex_sig) {
            return Err(ConnectorError::InvalidSignature);
        }
        Ok(())
    }

    fn parse(
        &self,
        body: &[u8],
        _headers: &HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<Vec<ParsedEvent>, ConnectorError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::MalformedPayload(e.to_string()))?;

        let event_type = payload
            .pointer("/event/type")
            .or_else(|| payload.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or(&ctx.trigger_type)
            .to_string();

        let event_id = payload
            .get("event_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(vec![ParsedEvent {
            event_type,
            event_data: payload,
            external_event_id: event_id,
        }])
    }

    fn challenge(&self, body: &[u8], _headers: &HeaderMap) -> Option<ChallengeResponse> {
        let payload: serde_json::Value = serde_json::from_slice(body).ok()?;
        if payload.get("type").and_then(|v| v.as_str()) != Some("url_verification") {
            return None;
        }
        let challenge = payload.get("challenge").and_then(|v| v.as_str())?;
        Some(ChallengeResponse::new(json!({ "challenge": challenge })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::hmac_sha256_hex;
    use chrono::Utc;
    use uuid::Uuid;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";

    fn connector() -> SlackConnector {
        SlackConnector::new(Some(SECRET.to_string()), 300)
    }

    fn context() -> WebhookContext {
        WebhookContext {
            trigger_id: Uuid::new_v4(),
            app_name: APP_NAME.to_string(),
            trigger_type: "message".to_string(),
            webhook_url: "https://hooks.example.com/webhooks/slack/x".to_string(),
            external_webhook_id: None,
            config: serde_json::json!({}),
            verification_token: "unused-for-slack".to_string(),
        }
    }

    fn headers_for(body: &[u8], ts_secs: i64) -> HeaderMap {
        let ts = ts_secs.to_string();
        let basestring = format!("v0:{}:{}", ts, String::from_utf8_lossy(body));
        let sig = format!("v0={}", hmac_sha256_hex(SECRET.as_bytes(), basestring.as_bytes()));

        let mut headers = HeaderMap::new();
        headers.insert("X-Slack-Request-Timestamp", ts.parse().unwrap());
        headers.insert("X-Slack-Signature", sig.parse().unwrap());
        headers
    }

    #[test]
    fn verify_accepts_fresh_signed_request() {
        let body = br#"{"type":"event_callback","event_id":"Ev1"}"#;
        let headers = headers_for(body, Utc::now().timestamp());
        assert!(connector().verify(body, &headers, &context()).is_ok());
    }

    #[test]
    fn verify_rejects_replayed_timestamp_with_valid_hmac() {
        // Mathematically correct signature over a 10-minute-old timestamp.
        let body = br#"{"type":"event_callback"}"#;
        let headers = headers_for(body, Utc::now().timestamp() - 600);
        let err = connector().verify(body, &headers, &context()).unwrap_err();
        assert!(matches!(err, ConnectorError::StaleTimestamp { .. }));
    }

    #[test]
    fn verify_rejects_wrong_signature() {
        let body = br#"{"type":"event_callback"}"#;
        let mut headers = headers_for(body, Utc::now().timestamp());
        headers.insert("X-Slack-Signature", "v0=deadbeef".parse().unwrap());
        let err = connector().verify(body, &headers, &context()).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidSignature));
    }

    #[test]
    fn verify_without_secret_is_a_config_error() {
        let bare = SlackConnector::new(None, 300);
        let body = br#"{}"#;
        let headers = headers_for(body, Utc::now().timestamp());
        let err = bare.verify(body, &headers, &context()).unwrap_err();
        assert!(matches!(err, ConnectorError::Config(_)));
    }

    #[test]
    fn challenge_is_recognised_and_echoed() {
        let body = br#"{"type":"url_verification","challenge":"c123","token":"t"}"#;
        let response = connector().challenge(body, &HeaderMap::new()).unwrap();
        assert_eq!(response.body["challenge"], "c123");
    }

    #[test]
    fn ordinary_events_are_not_challenges() {
        let body = br#"{"type":"event_callback","event":{"type":"message"}}"#;
        assert!(connector().challenge(body, &HeaderMap::new()).is_none());
    }

    #[test]
    fn parse_extracts_event_id_and_inner_type() {
        let body = br#"{
            "type": "event_callback",
            "event_id": "Ev123",
            "event": {"type": "message", "text": "hi"}
        }"#;
        let events = connector().parse(body, &HeaderMap::new(), &context()).unwrap();
        assert_eq!(events[0].event_type, "message");
        assert_eq!(events[0].external_event_id.as_deref(), Some("Ev123"));
    }

    #[tokio::test]
    async fn register_returns_setup_instructions() {
        let account = LinkedAccount {
            id: Uuid::new_v4(),
            app_name: APP_NAME.to_string(),
            credentials: hookwire_core::account::Credentials::Oauth2 {
                access_token: "xoxb".into(),
            },
            metadata: Default::default(),
        };
        let registration = connector().register(&context(), &account).await.unwrap();
        assert!(registration.external_webhook_id.is_none());
        let instructions = registration.setup_instructions.unwrap();
        assert!(instructions.contains("Events API"));
    }
}
