//! Registration orchestrator: the single writer of trigger lifecycle state
//! (alongside the background scheduler).
//!
//! `create` persists the row first (status `pending`), then registers with
//! the provider. A retryable registration failure leaves the trigger in
//! `error` with a retry budget in its config; an unretryable one rolls the
//! row back. `delete` unregisters best-effort — a dangling remote hook beats
//! blocking removal.

use std::sync::Arc;

use hookwire_connectors::{ConnectorRegistry, WebhookContext};
use hookwire_core::account::LinkedAccountStore;
use hookwire_core::error::CoreError;
use hookwire_core::secret::TokenCipher;
use hookwire_core::token::generate_verification_token;
use hookwire_core::types::Id;
use hookwire_db::models::{NewTrigger, Trigger, TriggerStatus};
use hookwire_db::repositories::TriggerRepo;
use hookwire_db::DbPool;
use serde::Deserialize;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::metrics::MetricsCollector;

/// Maximum registration retries recorded before the scheduler gives up.
pub const MAX_REGISTRATION_RETRIES: i64 = 3;

/// Request to create a new trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTriggerRequest {
    pub project_id: Id,
    pub app_name: String,
    pub linked_account_id: Id,
    pub trigger_name: String,
    pub trigger_type: String,
    pub description: Option<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Patch applied by `update`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTriggerRequest {
    /// Only `active` (resume) and `paused` (pause) are accepted.
    pub status: Option<TriggerStatus>,
    pub description: Option<String>,
    /// Replacing the config re-registers the remote subscription.
    pub config: Option<serde_json::Value>,
}

/// Per-item outcome of a bulk operation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BulkOutcome {
    pub id: Id,
    pub ok: bool,
    pub error: Option<String>,
}

/// Build the connector view of a trigger, decrypting its token.
pub fn webhook_context(
    trigger: &Trigger,
    cipher: &TokenCipher,
) -> Result<WebhookContext, CoreError> {
    Ok(WebhookContext {
        trigger_id: trigger.id,
        app_name: trigger.app_name.clone(),
        trigger_type: trigger.trigger_type.clone(),
        webhook_url: trigger.webhook_url.clone(),
        external_webhook_id: trigger.external_webhook_id.clone(),
        config: trigger.config.clone(),
        verification_token: cipher.decrypt(&trigger.verification_token)?,
    })
}

pub struct TriggerOrchestrator {
    pool: DbPool,
    connectors: Arc<ConnectorRegistry>,
    accounts: Arc<dyn LinkedAccountStore>,
    cipher: Arc<TokenCipher>,
    metrics: Arc<MetricsCollector>,
    callback_base_url: String,
}

impl TriggerOrchestrator {
    pub fn new(
        pool: DbPool,
        connectors: Arc<ConnectorRegistry>,
        accounts: Arc<dyn LinkedAccountStore>,
        cipher: Arc<TokenCipher>,
        metrics: Arc<MetricsCollector>,
        callback_base_url: String,
    ) -> Self {
        Self {
            pool,
            connectors,
            accounts,
            cipher,
            metrics,
            callback_base_url,
        }
    }

    /// Create a trigger and register it with the provider.
    ///
    /// The returned trigger is `active` on success, or `error` when the
    /// provider call failed but is worth retrying. Unretryable failures roll
    /// the row back and surface the error.
    pub async fn create(&self, request: CreateTriggerRequest) -> AppResult<Trigger> {
        let app_name = request.app_name.to_uppercase();
        hookwire_connectors::catalog::validate_trigger_type(&app_name, &request.trigger_type)?;

        let connector = self
            .connectors
            .get(&app_name)
            .ok_or_else(|| AppError::BadRequest(format!("no connector for app {app_name}")))?;

        let account = self.accounts.get(request.linked_account_id).await?;
        if !account.app_name.eq_ignore_ascii_case(&app_name) {
            return Err(AppError::BadRequest(format!(
                "linked account belongs to {}, not {app_name}",
                account.app_name
            )));
        }

        let trigger_id = Id::new_v4();
        let webhook_url = format!(
            "{}/webhooks/{}/{}",
            self.callback_base_url.trim_end_matches('/'),
            app_name.to_lowercase(),
            trigger_id
        );
        let token = generate_verification_token();
        let encrypted_token = self.cipher.encrypt(&token)?;

        let input = NewTrigger {
            id: trigger_id,
            project_id: request.project_id,
            app_name: app_name.clone(),
            linked_account_id: request.linked_account_id,
            trigger_name: request.trigger_name,
            trigger_type: request.trigger_type,
            description: request.description,
            webhook_url,
            verification_token: encrypted_token,
            config: ensure_object(request.config),
        };

        let trigger = TriggerRepo::create(&self.pool, &input)
            .await
            .map_err(classify_create_error)?;

        let mut ctx = webhook_context(&trigger, &self.cipher)?;
        ctx.verification_token = token;

        match connector.register(&ctx, &account).await {
            Ok(registration) => {
                TriggerRepo::update_external_id(
                    &self.pool,
                    trigger.id,
                    registration.external_webhook_id.as_deref(),
                    registration.expires_at,
                )
                .await?;
                if let Some(instructions) = &registration.setup_instructions {
                    let mut config = trigger.config.clone();
                    config["setup_instructions"] = json!(instructions);
                    TriggerRepo::update_config(&self.pool, trigger.id, &config).await?;
                }
                TriggerRepo::update_status(&self.pool, trigger.id, TriggerStatus::Active, None)
                    .await?;

                self.metrics.trigger_registration(&app_name, "success");
                tracing::info!(
                    trigger_id = %trigger.id,
                    app = %app_name,
                    external_webhook_id = ?registration.external_webhook_id,
                    "Trigger registered"
                );
            }
            Err(e) if e.is_retryable() => {
                let mut config = trigger.config.clone();
                config["retry_count"] = json!(1);
                TriggerRepo::update_config(&self.pool, trigger.id, &config).await?;
                TriggerRepo::update_status(
                    &self.pool,
                    trigger.id,
                    TriggerStatus::Error,
                    Some(&e.to_string()),
                )
                .await?;

                self.metrics.trigger_registration(&app_name, "failed");
                tracing::warn!(
                    trigger_id = %trigger.id,
                    app = %app_name,
                    error = %e,
                    "Trigger registration failed, scheduler will retry"
                );
            }
            Err(e) => {
                // Unretryable (bad config, permanent rejection): roll back.
                TriggerRepo::delete(&self.pool, trigger.id).await?;
                self.metrics.trigger_registration(&app_name, "failed");
                tracing::warn!(
                    trigger_id = %trigger.id,
                    app = %app_name,
                    error = %e,
                    "Trigger registration rejected, rolling back"
                );
                return Err(e.into());
            }
        }

        self.load(trigger.id).await
    }

    /// Apply a patch: pause/resume without touching the provider, replace
    /// config with re-registration.
    pub async fn update(&self, id: Id, patch: UpdateTriggerRequest) -> AppResult<Trigger> {
        let trigger = self.load(id).await?;

        if let Some(status) = patch.status {
            let allowed = matches!(
                (trigger.status, status),
                (TriggerStatus::Active, TriggerStatus::Paused)
                    | (TriggerStatus::Paused, TriggerStatus::Active)
            );
            if !allowed {
                return Err(AppError::Core(CoreError::Validation(format!(
                    "cannot transition from {} to {}",
                    trigger.status, status
                ))));
            }
            TriggerRepo::update_status(&self.pool, id, status, None).await?;
            tracing::info!(trigger_id = %id, status = %status, "Trigger status updated");
        }

        if let Some(description) = &patch.description {
            TriggerRepo::update_description(&self.pool, id, Some(description.as_str())).await?;
        }

        if let Some(config) = patch.config {
            self.replace_config(&trigger, ensure_object(config)).await?;
        }

        self.load(id).await
    }

    /// Replace the config map; if the trigger is registered remotely, the
    /// subscription is torn down and re-created so provider-side settings
    /// (repository, watched property, ...) follow the new config.
    async fn replace_config(
        &self,
        trigger: &Trigger,
        config: serde_json::Value,
    ) -> AppResult<()> {
        let connector = self
            .connectors
            .get(&trigger.app_name)
            .ok_or_else(|| AppError::BadRequest(format!("no connector for {}", trigger.app_name)))?;
        let account = self.accounts.get(trigger.linked_account_id).await?;

        if trigger.external_webhook_id.is_some() {
            let old_ctx = webhook_context(trigger, &self.cipher)?;
            if let Err(e) = connector.unregister(&old_ctx, &account).await {
                tracing::warn!(
                    trigger_id = %trigger.id,
                    error = %e,
                    "Unregister before config change failed, proceeding"
                );
            }

            let mut new_ctx = old_ctx;
            new_ctx.config = config.clone();
            new_ctx.external_webhook_id = None;

            match connector.register(&new_ctx, &account).await {
                Ok(registration) => {
                    TriggerRepo::update_external_id(
                        &self.pool,
                        trigger.id,
                        registration.external_webhook_id.as_deref(),
                        registration.expires_at,
                    )
                    .await?;
                    self.metrics
                        .trigger_registration(&trigger.app_name, "success");
                }
                Err(e) => {
                    TriggerRepo::update_config(&self.pool, trigger.id, &config).await?;
                    TriggerRepo::update_status(
                        &self.pool,
                        trigger.id,
                        TriggerStatus::Error,
                        Some(&e.to_string()),
                    )
                    .await?;
                    self.metrics
                        .trigger_registration(&trigger.app_name, "failed");
                    return Err(e.into());
                }
            }
        }

        TriggerRepo::update_config(&self.pool, trigger.id, &config).await?;
        Ok(())
    }

    /// Delete a trigger. The remote unregister is best-effort; deletion
    /// proceeds regardless and cascades to the trigger's events.
    pub async fn delete(&self, id: Id) -> AppResult<()> {
        let trigger = self.load(id).await?;

        if let Some(connector) = self.connectors.get(&trigger.app_name) {
            match self.accounts.get(trigger.linked_account_id).await {
                Ok(account) => {
                    let ctx = webhook_context(&trigger, &self.cipher)?;
                    match connector.unregister(&ctx, &account).await {
                        Ok(()) => {
                            self.metrics.trigger_unregister(&trigger.app_name, "success");
                        }
                        Err(e) => {
                            self.metrics.trigger_unregister(&trigger.app_name, "failed");
                            tracing::warn!(
                                trigger_id = %id,
                                error = %e,
                                "Unregister failed, deleting trigger anyway"
                            );
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        trigger_id = %id,
                        error = %e,
                        "Linked account unavailable, deleting trigger anyway"
                    );
                }
            }
        }

        TriggerRepo::delete(&self.pool, id).await?;
        tracing::info!(trigger_id = %id, "Trigger deleted");
        Ok(())
    }

    /// Pause or resume a set of triggers, reporting per-item outcomes.
    pub async fn bulk_update_status(
        &self,
        ids: &[Id],
        status: TriggerStatus,
    ) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let patch = UpdateTriggerRequest {
                status: Some(status),
                ..UpdateTriggerRequest::default()
            };
            let outcome = match self.update(id, patch).await {
                Ok(_) => BulkOutcome {
                    id,
                    ok: true,
                    error: None,
                },
                Err(e) => BulkOutcome {
                    id,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Delete a set of triggers, reporting per-item outcomes.
    pub async fn bulk_delete(&self, ids: &[Id]) -> Vec<BulkOutcome> {
        let mut outcomes = Vec::with_capacity(ids.len());
        for &id in ids {
            let outcome = match self.delete(id).await {
                Ok(()) => BulkOutcome {
                    id,
                    ok: true,
                    error: None,
                },
                Err(e) => BulkOutcome {
                    id,
                    ok: false,
                    error: Some(e.to_string()),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn load(&self, id: Id) -> AppResult<Trigger> {
        TriggerRepo::find_by_id(&self.pool, id)
            .await?
            .ok_or(AppError::Core(CoreError::NotFound {
                entity: "Trigger",
                id,
            }))
    }
}

/// Guarantee the config is a JSON object so counters can be written into it.
fn ensure_object(config: serde_json::Value) -> serde_json::Value {
    if config.is_object() {
        config
    } else {
        json!({})
    }
}

/// Natural-key violations surface as CONFLICT; everything else passes
/// through as a database error.
fn classify_create_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return AppError::Core(CoreError::Conflict(
                "a trigger with this name already exists for this app and account".into(),
            ));
        }
    }
    AppError::Database(err)
}
