use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hookwire_api::accounts::InMemoryAccountStore;
use hookwire_api::background::{self, SchedulerContext};
use hookwire_api::config::ServerConfig;
use hookwire_api::metrics::MetricsCollector;
use hookwire_api::rate_limit::RateLimiter;
use hookwire_api::router::build_app_router;
use hookwire_api::state::AppState;
use hookwire_connectors::ConnectorRegistry;
use hookwire_core::secret::TokenCipher;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hookwire_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = hookwire_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    hookwire_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    hookwire_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Token cipher ---
    let cipher = Arc::new(
        TokenCipher::from_base64_key(&config.token_key)
            .expect("TOKEN_KEY must be a base64-encoded 32-byte key"),
    );

    // --- Connectors ---
    let connectors = Arc::new(ConnectorRegistry::with_defaults(&config.connectors));
    tracing::info!(apps = ?connectors.app_names(), "Connector registry initialised");

    // --- Linked accounts ---
    // Seeded from LINKED_ACCOUNTS_JSON until the platform account service is
    // wired in.
    let accounts = match std::env::var("LINKED_ACCOUNTS_JSON") {
        Ok(raw) => Arc::new(
            InMemoryAccountStore::from_json_str(&raw)
                .expect("LINKED_ACCOUNTS_JSON must be a valid account list"),
        ),
        Err(_) => Arc::new(InMemoryAccountStore::new()),
    };

    // --- Rate limiter & metrics ---
    let rate_limiter = Arc::new(RateLimiter::new(config.global_rate, config.trigger_rate));
    let metrics = Arc::new(MetricsCollector::new());

    // --- Background scheduler ---
    let scheduler_cancel = CancellationToken::new();
    let scheduler_ctx = SchedulerContext {
        pool: pool.clone(),
        connectors: Arc::clone(&connectors),
        accounts: accounts.clone(),
        cipher: Arc::clone(&cipher),
        metrics: Arc::clone(&metrics),
    };
    let cadences = config.scheduler.clone();
    let task_handles = vec![
        tokio::spawn(background::renewal::run(
            scheduler_ctx.clone(),
            cadences.renewal_interval_secs,
            scheduler_cancel.child_token(),
        )),
        tokio::spawn(background::expiry::run(
            scheduler_ctx.clone(),
            cadences.expiry_interval_secs,
            scheduler_cancel.child_token(),
        )),
        tokio::spawn(background::retry::run(
            scheduler_ctx.clone(),
            cadences.retry_interval_secs,
            scheduler_cancel.child_token(),
        )),
        tokio::spawn(background::cleanup::run(
            scheduler_ctx.clone(),
            cadences.cleanup_interval_secs,
            scheduler_cancel.child_token(),
        )),
        tokio::spawn(background::gauges::run(
            scheduler_ctx,
            cadences.gauge_interval_secs,
            scheduler_cancel.child_token(),
        )),
    ];
    tracing::info!("Background scheduler started (renewal, expiry, retry, cleanup, gauges)");

    // --- App state & router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        connectors,
        rate_limiter,
        metrics,
        cipher,
        accounts,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    scheduler_cancel.cancel();
    for handle in task_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }
    tracing::info!("Background scheduler stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
