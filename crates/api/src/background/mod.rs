//! Background tasks and scheduled jobs.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`, plus a `*_once` function performing a single
//! pass (what the loop calls, and what the tests exercise). All tasks accept
//! a [`CancellationToken`] for graceful shutdown.
//!
//! A task pass takes a Postgres advisory lock first, so two instances of the
//! same task type never run concurrently even with multiple processes
//! hosting the scheduler. Tasks only touch the database and the provider
//! APIs; they never block ingestion.

use std::sync::Arc;

use hookwire_connectors::ConnectorRegistry;
use hookwire_core::account::LinkedAccountStore;
use hookwire_core::secret::TokenCipher;
use hookwire_db::DbPool;

use crate::metrics::MetricsCollector;

pub mod cleanup;
pub mod expiry;
pub mod gauges;
pub mod renewal;
pub mod retry;

/// Advisory lock keys, one per task type.
pub(crate) mod locks {
    pub const RENEWAL: i64 = 0x686b_7701;
    pub const EXPIRY: i64 = 0x686b_7702;
    pub const RETRY: i64 = 0x686b_7703;
    pub const CLEANUP: i64 = 0x686b_7704;
}

/// Everything a scheduler pass needs, cheaply cloneable.
#[derive(Clone)]
pub struct SchedulerContext {
    pub pool: DbPool,
    pub connectors: Arc<ConnectorRegistry>,
    pub accounts: Arc<dyn LinkedAccountStore>,
    pub cipher: Arc<TokenCipher>,
    pub metrics: Arc<MetricsCollector>,
}

/// Run one pass under the task's advisory lock. Returns `None` when another
/// scheduler instance holds the lock (the pass is skipped, not queued).
///
/// The lock lives on a connection pinned for the duration of the pass;
/// session advisory locks must be released on the connection that took them.
pub(crate) async fn with_advisory_lock<T, F>(
    pool: &DbPool,
    key: i64,
    task: &'static str,
    pass: F,
) -> Result<Option<T>, sqlx::Error>
where
    F: std::future::Future<Output = Result<T, sqlx::Error>>,
    F: Send,
    T: Send,
{
    let mut conn = pool.acquire().await?;
    if !hookwire_db::try_advisory_lock(&mut *conn, key).await? {
        tracing::debug!(task, "Another scheduler instance holds the lock, skipping pass");
        return Ok(None);
    }
    let result = pass.await;
    if let Err(e) = hookwire_db::advisory_unlock(&mut *conn, key).await {
        tracing::warn!(task, error = %e, "Failed to release advisory lock");
    }
    result.map(Some)
}
