//! Database access layer: pool construction, migrations, entity models, and
//! repositories for the `triggers` and `trigger_events` tables.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply all embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

// ---------------------------------------------------------------------------
// Advisory locks
// ---------------------------------------------------------------------------

/// Try to take a session-level Postgres advisory lock.
///
/// Used by the background scheduler so two instances of the same task type
/// never run concurrently across processes. Returns `false` without blocking
/// when another session holds the lock.
///
/// Advisory locks belong to the session, so lock and unlock must run on the
/// same pinned connection — hence `&mut PgConnection` rather than the pool.
pub async fn try_advisory_lock(
    conn: &mut sqlx::PgConnection,
    key: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(key)
        .fetch_one(conn)
        .await
}

/// Release a session-level advisory lock taken with [`try_advisory_lock`]
/// on the same connection.
pub async fn advisory_unlock(
    conn: &mut sqlx::PgConnection,
    key: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(key)
        .execute(conn)
        .await?;
    Ok(())
}
