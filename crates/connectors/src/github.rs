//! GitHub connector: per-repository webhooks over the REST API.
//!
//! Hooks are created with `POST /repos/{owner}/{repo}/hooks`; the trigger's
//! verification token doubles as the hook secret, so inbound deliveries are
//! authenticated against `X-Hub-Signature-256` (`sha256=<hex HMAC of the raw
//! body>`). Dedup uses the `X-GitHub-Delivery` header, the event name comes
//! from `X-GitHub-Event`.

use async_trait::async_trait;
use http::HeaderMap;
use hookwire_core::account::LinkedAccount;
use serde_json::json;

use crate::error::ConnectorError;
use crate::signature::verify_hmac_hex;
use crate::types::{ParsedEvent, Registration, WebhookContext};
use crate::Connector;

pub const APP_NAME: &str = "GITHUB";

const BASE_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

pub struct GitHubConnector {
    http: reqwest::Client,
}

impl GitHubConnector {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Repository owner and name from the trigger config.
    fn repo_info(ctx: &WebhookContext) -> Result<(String, String), ConnectorError> {
        let owner = ctx
            .config_str("owner")
            .ok_or_else(|| ConnectorError::Config("trigger config is missing 'owner'".into()))?;
        let repo = ctx
            .config_str("repo")
            .ok_or_else(|| ConnectorError::Config("trigger config is missing 'repo'".into()))?;
        Ok((owner.to_string(), repo.to_string()))
    }

    /// Look up an existing hook pointing at our callback URL. Used to make
    /// registration idempotent when GitHub answers "hook already exists".
    async fn find_existing_hook(
        &self,
        owner: &str,
        repo: &str,
        callback_url: &str,
        token: &str,
    ) -> Result<Option<String>, ConnectorError> {
        let response = self
            .http
            .get(format!("{BASE_URL}/repos/{owner}/{repo}/hooks"))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::from_status(status, &body));
        }

        let hooks: Vec<serde_json::Value> = response.json().await?;
        let existing = hooks.iter().find(|hook| {
            hook.pointer("/config/url").and_then(|v| v.as_str()) == Some(callback_url)
        });
        Ok(existing
            .and_then(|hook| hook.get("id"))
            .and_then(|id| id.as_i64())
            .map(|id| id.to_string()))
    }
}

#[async_trait]
impl Connector for GitHubConnector {
    fn app_name(&self) -> &'static str {
        APP_NAME
    }

    async fn register(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<Registration, ConnectorError> {
        let (owner, repo) = Self::repo_info(ctx)?;
        let token = account.oauth_token()?;

        let hook = json!({
            "name": "web",
            "active": true,
            "events": [ctx.trigger_type],
            "config": {
                "url": ctx.webhook_url,
                "content_type": "json",
                "secret": ctx.verification_token,
                "insecure_ssl": "0",
            },
        });

        let response = self
            .http
            .post(format!("{BASE_URL}/repos/{owner}/{repo}/hooks"))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&hook)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            // "Hook already exists on this repository" — reconcile against
            // the hook list so a repeated register is a no-op.
            if let Some(id) = self
                .find_existing_hook(&owner, &repo, &ctx.webhook_url, token)
                .await?
            {
                tracing::info!(
                    trigger_id = %ctx.trigger_id,
                    hook_id = %id,
                    "GitHub hook already registered, reusing"
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
        let hook_id = created
            .get("id")
            .and_then(|id| id.as_i64())
            .ok_or_else(|| ConnectorError::Permanent("GitHub returned no hook id".into()))?;

        tracing::info!(
            trigger_id = %ctx.trigger_id,
            hook_id,
            owner,
            repo,
            "GitHub hook registered"
        );

        Ok(Registration {
            external_webhook_id: Some(hook_id.to_string()),
            ..Registration::default()
        })
    }

    async fn unregister(
        &self,
        ctx: &WebhookContext,
        account: &LinkedAccount,
    ) -> Result<(), ConnectorError> {
        let Some(hook_id) = &ctx.external_webhook_id else {
            // Never registered remotely, nothing to remove.
            return Ok(());
        };
        let (owner, repo) = Self::repo_info(ctx)?;
        let token = account.oauth_token()?;

        let response = self
            .http
            .delete(format!("{BASE_URL}/repos/{owner}/{repo}/hooks/{hook_id}"))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
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
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .ok_or(ConnectorError::MissingHeader("X-Hub-Signature-256"))?;

        let hex_sig = signature
            .strip_prefix("sha256=")
            .ok_or(ConnectorError::InvalidSignature)?;

        if !verify_hmac_hex(ctx.verification_token.as_bytes(), body, hex_sig) {
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
            .get("X-GitHub-Event")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(&ctx.trigger_type)
            .to_string();

        let delivery_id = headers
            .get("X-GitHub-Delivery")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(vec![ParsedEvent {
            event_type,
            event_data: payload,
            external_event_id: delivery_id,
        }])
    }
}
