//! Shopify connector: webhook subscriptions over the GraphQL Admin API.
//!
//! Subscriptions are managed with the `webhookSubscriptionCreate` /
//! `webhookSubscriptionDelete` mutations against the shop domain stored in
//! the linked-account metadata. Deliveries carry a base64 HMAC-SHA256 of the
//! raw body in `X-Shopify-Hmac-SHA256`, computed with the app's client
//! secret; the delivery id for dedup is the `X-Shopify-Webhook-Id` header.

use async_trait::async_trait;
use http::HeaderMap;
use hookwire_core::account::LinkedAccount;
use serde_json::json;

use crate::error::ConnectorError;
use crate::signature::verify_hmac_base64;
use crate::types::{ParsedEvent, Registration, WebhookContext};
use crate::Connector;

pub const APP_NAME: &str = "SHOPIFY";

const GRAPHQL_API_VERSION: &str = "2024-07";

const CREATE_MUTATION: &str = r#"
mutation webhookSubscriptionCreate($topic: WebhookSubscriptionTopic!, $webhookSubscription: WebhookSubscriptionInput!) {
  webhookSubscriptionCreate(topic: $topic, webhookSubscription: $webhookSubscription) {
    webhookSubscription { id topic }
    userErrors { field message }
  }
}
"#;

const DELETE_MUTATION: &str = r#"
mutation webhookSubscriptionDelete($id: ID!) {
  webhookSubscriptionDelete(id: $id) {
    deletedWebhookSubscriptionId
    userErrors { field message }
  }
}
"#;

const LIST_QUERY: &str = r#"
query webhookSubscriptions($topics: [WebhookSubscriptionTopic!]) {
  webhookSubscriptions(first: 50, topics: $topics) {
    edges { node { id endpoint { __typename ... on WebhookHttpEndpoint { callbackUrl } } } }
  }
}
"#;

pub struct ShopifyConnector {
    client_secret: Option<String>,
    http: reqwest::Client,
}

impl ShopifyConnector {
    pub fn new(client_secret: Option<String>, http: reqwest::Client) -> Self {
        Self {
            client_secret,
            http,
        }
    }

    fn client_secret(&self) -> Result<&str, ConnectorError> {
        self.client_secret.as_deref().ok_or_else(|| {
            ConnectorError::Config("Shopify client secret is not configured".into())
        })
    }

    /// GraphQL endpoint for the shop bound to this linked account.
    fn graphql_endpoint(account: &LinkedAccount) -> Result<String, ConnectorError> {
        let shop = account
            .metadata("shop_domain")
            .or_else(|| account.metadata("shop"))
            .ok_or_else(|| {
                ConnectorError::Config("linked account metadata is missing 'shop_domain'".into())
            })?;
        Ok(format!(
            "https://{shop}/admin/api/{GRAPHQL_API_VERSION}/graphql.json"
        ))
    }

    /// Convert a trigger type to Shopify topic format:
    /// `"orders/create"` -> `"ORDERS_CREATE"`.
    fn to_topic(trigger_type: &str) -> String {
        trigger_type.replace(['/', '.'], "_").to_uppercase()
    }

    async fn graphql(
        &self,
        account: &LinkedAccount,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value, ConnectorError> {
        let endpoint = Self::graphql_endpoint(account)?;
        let token = account.oauth_token()?;

        let response = self
            .http
            .post(&endpoint)
            .header("X-Shopify-Access-Token", token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::from_status(status, &body));
        }

        let data: serde_json::Value = response.json().await?;
        if let Some(errors) = data.get("errors") {
            return Err(ConnectorError::Permanent(format!(
                "GraphQL errors: {errors}"
            )));
        }
        Ok(data)
    }

    /// Find an existing subscription for the topic pointing at our callback
    /// URL, so registration stays idempotent per linked account.
    async fn find_existing_subscription(
        &self,
        account: &LinkedAccount,
        topic: &str,
        callback_url: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let data = self
            .graphql(account, LIST_QUERY, json!({ "topics": [topic] }))
            .await?;
        let edges = data
            .pointer("/data/webhookSubscriptions/edges")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let existing = edges.iter().find(|edge| {
            edge.pointer("/node/endpoint/callbackUrl").and_then(|v| v.as_str())
                == Some(callback_url)
        });
        Ok(existing
            .and_then(|edge| edge.pointer("/node/id"))
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }
}

#[async_trait]
impl Connector for ShopifyConnector {
    fn app_name(&self) -> &'static str {
        APP_NAME
    }

    async fn register(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        let topic = Self::to_topic(&ctx.trigger_type);

        let data = self
            .graphql(
                account,
                CREATE_MUTATION,
                json!({
                    "topic": topic,
                    "webhookSubscription": {
                        "callbackUrl": ctx.webhook_url,
                        "format": "JSON",
                    },
                }),
            )
            .await?;

        let result = data
            .pointer("/data/webhookSubscriptionCreate")
            .cloned()
            .unwrap_or_default();

        let user_errors = result
            .get("userErrors")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        if !user_errors.is_empty() {
            let taken = user_errors.iter().any(|err| {
                err.get("message")
                    .and_then(|m| m.as_str())
                    .is_some_and(|m| m.contains("taken") || m.contains("already"))
            });
            if taken {
                // Address already subscribed for this topic — reconcile.
                if let Some(id) = self
                    .find_existing_subscription(account, &topic, &ctx.webhook_url)
                    .await?
                {
                    tracing::info!(
                        trigger_id = %ctx.trigger_id,
                        subscription_id = %id,
                        "Shopify subscription already exists, reusing"
                    );
                    return Ok(Registration {
                        external_webhook_id: Some(id),
                        ..Registration::default()
                    });
                }
            }
            return Err(ConnectorError::Permanent(format!(
                "Shopify user errors: {user_errors:?}"
            )));
        }

        let subscription_id = result
            .pointer("/webhookSubscription/id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                ConnectorError::Permanent("Shopify returned no subscription id".into())
            })?;

        tracing::info!(
            trigger_id = %ctx.trigger_id,
            subscription_id,
            topic,
            "Shopify subscription registered"
        );

        Ok(Registration {
            external_webhook_id: Some(subscription_id.to_string()),
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

        let data = self
            .graphql(account, DELETE_MUTATION, json!({ "id": subscription_id }))
            .await?;

        let user_errors = data
            .pointer("/data/webhookSubscriptionDelete/userErrors")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let only_not_found = !user_errors.is_empty()
            && user_errors.iter().all(|err| {
                err.get("message")
                    .and_then(|m| m.as_str())
                    .is_some_and(|m| m.contains("not found") || m.contains("does not exist"))
            });
        if !user_errors.is_empty() && !only_not_found {
            return Err(ConnectorError::Permanent(format!(
                "Shopify user errors: {user_errors:?}"
            )));
        }
        Ok(())
    }

    fn verify(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        _ctx: &WebhookContext,
    ) -> Result<(), ConnectorError> {
        let signature = headers
            .get("X-Shopify-Hmac-SHA256")
            .and_then(|v| v.to_str().ok())
            .ok_or(ConnectorError::MissingHeader("X-Shopify-Hmac-SHA256"))?;

        let secret = self.client_secret()?;
        if !verify_hmac_base64(secret.as_bytes(), body, signature) {
            return Err(ConnectorError::InvalidSignature);
        }
        Ok(())
    }

    fn parse(
        &self,
        body: &[u8],
        headers: &HeaderMap,
        ctx: &WebhookContext,
    ) -> Result<Vec<ParsedEvent>, ConnectorError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| ConnectorError::MalformedPayload(e.to_string()))?;

        let event_type = headers
            .get("X-Shopify-Topic")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(&ctx.trigger_type)
            .to_string();

        let webhook_id = headers
            .get("X-Shopify-Webhook-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(vec![ParsedEvent {
            event_type,
            event_data: payload,
            external_event_id: webhook_id,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::hmac_sha256_base64;
    use uuid::Uuid;

    fn connector() -> ShopifyConnector {
        ShopifyConnector::new(Some("hush".to_string()), reqwest::Client::new())
    }

    fn context() -> WebhookContext {
        WebhookContext {
            trigger_id: Uuid::new_v4(),
            app_name: APP_NAME.to_string(),
            trigger_type: "orders/create".to_string(),
            webhook_url: "https://hooks.example.com/webhooks/shopify/x".to_string(),
            external_webhook_id: None,
            config: serde_json::json!({}),
            verification_token: "unused-for-shopify".to_string(),
        }
    }

    #[test]
    fn verify_accepts_valid_hmac() {
        let body = br#"{"id":1}"#;
        let mut headers = HeaderMap::new();
        let sig = hmac_sha256_base64(b"hush", body);
        headers.insert("X-Shopify-Hmac-SHA256", sig.parse().unwrap());
        assert!(connector().verify(body, &headers, &context()).is_ok());
    }

    #[test]
    fn verify_rejects_body_tamper() {
        let mut headers = HeaderMap::new();
        let sig = hmac_sha256_base64(b"hush", br#"{"id":1}"#);
        headers.insert("X-Shopify-Hmac-SHA256", sig.parse().unwrap());
        let err = connector()
            .verify(br#"{"id":2}"#, &headers, &context())
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidSignature));
    }

    #[test]
    fn verify_requires_hmac_header() {
        let err = connector()
            .verify(b"{}", &HeaderMap::new(), &context())
            .unwrap_err();
        assert!(matches!(err, ConnectorError::MissingHeader(_)));
    }

    #[test]
    fn parse_takes_dedup_key_from_webhook_id_header() {
        let body = br#"{"id": 820982911946154500, "total_price": "19.00"}"#;
        let mut headers = HeaderMap::new();
        headers.insert("X-Shopify-Topic", "orders/create".parse().unwrap());
        headers.insert(
            "X-Shopify-Webhook-Id",
            "b54557e4-bdd9-4b37-8a5f".parse().unwrap(),
        );
        let events = connector().parse(body, &headers, &context()).unwrap();
        assert_eq!(events[0].event_type, "orders/create");
        assert_eq!(
            events[0].external_event_id.as_deref(),
            Some("b54557e4-bdd9-4b37-8a5f")
        );
    }

    #[test]
    fn topic_conversion() {
        assert_eq!(ShopifyConnector::to_topic("orders/create"), "ORDERS_CREATE");
        assert_eq!(ShopifyConnector::to_topic("app.uninstalled"), "APP_UNINSTALLED");
    }

    #[test]
    fn graphql_endpoint_requires_shop_domain() {
        let account = LinkedAccount {
            id: Uuid::new_v4(),
            app_name: APP_NAME.to_string(),
            credentials: hookwire_core::account::Credentials::Oauth2 {
                access_token: "shpat".into(),
            },
            metadata: Default::default(),
        };
        assert!(matches!(
            ShopifyConnector::graphql_endpoint(&account),
            Err(ConnectorError::Config(_))
        ));
    }
}
