//! Repository for the `trigger_events` table.

use hookwire_core::types::{Id, Timestamp};
use sqlx::PgPool;

use crate::models::trigger_event::{NewTriggerEvent, TriggerEvent, TriggerEventStatus};

const EVENT_COLUMNS: &str = "\
    id, trigger_id, event_type, event_data, external_event_id, status, \
    error_message, received_at, processed_at, delivered_at, expires_at";

/// Provides insert-or-ignore and lifecycle operations for trigger events.
pub struct TriggerEventRepo;

impl TriggerEventRepo {
    /// Insert a new event with dedup on `(trigger_id, external_event_id)`.
    ///
    /// Returns the resulting row and whether it was newly inserted. The
    /// insert relies on the unique constraint (`ON CONFLICT DO NOTHING`)
    /// rather than select-then-insert, so concurrent deliveries of the same
    /// provider event cannot both win.
    pub async fn create(
        pool: &PgPool,
        input: &NewTriggerEvent,
    ) -> Result<(TriggerEvent, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO trigger_events \
                 (trigger_id, event_type, event_data, external_event_id, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT ON CONSTRAINT uq_trigger_events_dedup DO NOTHING \
             RETURNING {EVENT_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(input.trigger_id)
            .bind(&input.event_type)
            .bind(&input.event_data)
            .bind(&input.external_event_id)
            .bind(input.expires_at)
            .fetch_optional(pool)
            .await?;

        if let Some(event) = inserted {
            return Ok((event, true));
        }

        // Conflict path: the dedup key exists, return the original row. Only
        // reachable when external_event_id is non-null.
        let external_event_id = input
            .external_event_id
            .as_deref()
            .ok_or(sqlx::Error::RowNotFound)?;
        let existing = Self::find_by_dedup_key(pool, input.trigger_id, external_event_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;
        Ok((existing, false))
    }

    /// Find an event by id.
    pub async fn find_by_id(pool: &PgPool, id: Id) -> Result<Option<TriggerEvent>, sqlx::Error> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM trigger_events WHERE id = $1");
        sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an event by its dedup key.
    pub async fn find_by_dedup_key(
        pool: &PgPool,
        trigger_id: Id,
        external_event_id: &str,
    ) -> Result<Option<TriggerEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM trigger_events \
             WHERE trigger_id = $1 AND external_event_id = $2"
        );
        sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(trigger_id)
            .bind(external_event_id)
            .fetch_optional(pool)
            .await
    }

    /// Transition an event's status, recording delivery/processing times and
    /// an optional error message.
    pub async fn mark_status(
        pool: &PgPool,
        id: Id,
        status: TriggerEventStatus,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE trigger_events SET \
                 status = $2, \
                 error_message = $3, \
                 processed_at = NOW(), \
                 delivered_at = CASE WHEN $2 = 'delivered'::trigger_event_status \
                                     THEN NOW() ELSE delivered_at END \
             WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List events with optional trigger/status/time-range filters, newest
    /// first.
    #[allow(clippy::too_many_arguments)]
    pub async fn list(
        pool: &PgPool,
        trigger_id: Option<Id>,
        status: Option<TriggerEventStatus>,
        since: Option<Timestamp>,
        until: Option<Timestamp>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TriggerEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM trigger_events \
             WHERE ($1::UUID IS NULL OR trigger_id = $1) \
               AND ($2::trigger_event_status IS NULL OR status = $2) \
               AND ($3::TIMESTAMPTZ IS NULL OR received_at >= $3) \
               AND ($4::TIMESTAMPTZ IS NULL OR received_at <= $4) \
             ORDER BY received_at DESC LIMIT $5 OFFSET $6"
        );
        sqlx::query_as::<_, TriggerEvent>(&query)
            .bind(trigger_id)
            .bind(status)
            .bind(since)
            .bind(until)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count events for a trigger, optionally restricted to one status.
    pub async fn count(
        pool: &PgPool,
        trigger_id: Id,
        status: Option<TriggerEventStatus>,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM trigger_events \
             WHERE trigger_id = $1 AND ($2::trigger_event_status IS NULL OR status = $2)",
        )
        .bind(trigger_id)
        .bind(status)
        .fetch_one(pool)
        .await
    }

    /// Number of events awaiting downstream processing (metrics gauge).
    pub async fn count_pending(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM trigger_events WHERE status = 'pending'")
            .fetch_one(pool)
            .await
    }

    /// Delete events past their retention expiry. Returns the number of rows
    /// removed.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM trigger_events WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
