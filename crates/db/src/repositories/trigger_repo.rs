//! Repository for the `triggers` table.

use hookwire_core::types::{Id, Timestamp};
use sqlx::PgPool;

use crate::models::trigger::{NewTrigger, Trigger, TriggerStatus};

const TRIGGER_COLUMNS: &str = "\
    id, project_id, app_name, linked_account_id, trigger_name, trigger_type, \
    description, webhook_url, external_webhook_id, verification_token, config, \
    status, last_error, last_triggered_at, expires_at, created_at, updated_at";

/// Provides CRUD and scheduler queries for triggers.
pub struct TriggerRepo;

impl TriggerRepo {
    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Insert a new trigger row in `pending` state.
    ///
    /// Fails with a unique violation when the natural key
    /// (project, app, linked account, trigger name) already exists; callers
    /// classify that to a conflict error.
    pub async fn create(pool: &PgPool, input: &NewTrigger) -> Result<Trigger, sqlx::Error> {
        let query = format!(
            "INSERT INTO triggers \
                 (id, project_id, app_name, linked_account_id, trigger_name, \
                  trigger_type, description, webhook_url, verification_token, config) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {TRIGGER_COLUMNS}"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(input.id)
            .bind(input.project_id)
            .bind(&input.app_name)
            .bind(input.linked_account_id)
            .bind(&input.trigger_name)
            .bind(&input.trigger_type)
            .bind(&input.description)
            .bind(&input.webhook_url)
            .bind(&input.verification_token)
            .bind(&input.config)
            .fetch_one(pool)
            .await
    }

    /// Find a trigger by id.
    pub async fn find_by_id(pool: &PgPool, id: Id) -> Result<Option<Trigger>, sqlx::Error> {
        let query = format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = $1");
        sqlx::query_as::<_, Trigger>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a trigger by its exact callback URL.
    pub async fn find_by_webhook_url(
        pool: &PgPool,
        webhook_url: &str,
    ) -> Result<Option<Trigger>, sqlx::Error> {
        let query = format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE webhook_url = $1");
        sqlx::query_as::<_, Trigger>(&query)
            .bind(webhook_url)
            .fetch_optional(pool)
            .await
    }

    /// List triggers for a project with optional app/status filters.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: Id,
        app_name: Option<&str>,
        status: Option<TriggerStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let query = format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers \
             WHERE project_id = $1 \
               AND ($2::TEXT IS NULL OR app_name = $2) \
               AND ($3::trigger_status IS NULL OR status = $3) \
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(project_id)
            .bind(app_name)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Delete a trigger by id. Cascade deletes all its events.
    pub async fn delete(pool: &PgPool, id: Id) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM triggers WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // State updates
    // -----------------------------------------------------------------------

    /// Set the status (and optionally a failure reason) of a trigger.
    pub async fn update_status(
        pool: &PgPool,
        id: Id,
        status: TriggerStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE triggers SET status = $2, last_error = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record the provider's subscription id and optional expiry after a
    /// successful registration or renewal.
    pub async fn update_external_id(
        pool: &PgPool,
        id: Id,
        external_webhook_id: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE triggers SET \
                 external_webhook_id = $2, \
                 expires_at = $3, \
                 updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(external_webhook_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update the free-form description.
    pub async fn update_description(
        pool: &PgPool,
        id: Id,
        description: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE triggers SET description = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(description)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Replace the config map of a trigger.
    pub async fn update_config(
        pool: &PgPool,
        id: Id,
        config: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE triggers SET config = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(config)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Update `last_triggered_at`. Best-effort from the ingest path.
    pub async fn touch_last_triggered(
        pool: &PgPool,
        id: Id,
        at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE triggers SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scheduler queries
    // -----------------------------------------------------------------------

    /// Active triggers whose subscription expires at or before `before`.
    pub async fn find_expiring(
        pool: &PgPool,
        before: Timestamp,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let query = format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers \
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1 \
             ORDER BY expires_at ASC"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(before)
            .fetch_all(pool)
            .await
    }

    /// Triggers in `error` state eligible for a registration retry: created
    /// after `created_after`, last touched at or before `attempted_before`,
    /// and with fewer than `max_attempts` recorded retries.
    pub async fn find_failed_registrations(
        pool: &PgPool,
        created_after: Timestamp,
        attempted_before: Timestamp,
        max_attempts: i64,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let query = format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers \
             WHERE status = 'error' \
               AND created_at >= $1 \
               AND updated_at <= $2 \
               AND COALESCE((config->>'retry_count')::BIGINT, 0) < $3 \
             ORDER BY updated_at ASC"
        );
        sqlx::query_as::<_, Trigger>(&query)
            .bind(created_after)
            .bind(attempted_before)
            .bind(max_attempts)
            .fetch_all(pool)
            .await
    }

    /// Transition all active triggers past their expiry to `expired`.
    /// Returns the number of triggers updated.
    pub async fn mark_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE triggers SET status = 'expired', updated_at = NOW() \
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Number of triggers currently in `active` state (metrics gauge).
    pub async fn count_active(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM triggers WHERE status = 'active'")
            .fetch_one(pool)
            .await
    }
}
