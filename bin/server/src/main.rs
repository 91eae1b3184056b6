use gatehouse_server::{
    app,
    auth::{
        AppState, CookieAttemptStore, MemoryAttemptStore, OidcClient, PendingAttemptStore,
        db::UserRepository,
    },
    config::{AttemptStoreKind, ServerConfig},
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    tracing::info!("Discovering OIDC provider...");
    let oidc_client = OidcClient::discover(config.oidc)
        .await
        .expect("failed to discover OIDC provider");

    let attempts: Arc<dyn PendingAttemptStore> = match config.session.attempt_store {
        AttemptStoreKind::Cookie => Arc::new(CookieAttemptStore),
        AttemptStoreKind::Memory => Arc::new(MemoryAttemptStore::with_capacity(
            config.session.max_pending_attempts,
        )),
    };

    // Spawn periodic cleanup of abandoned login attempts
    if config.session.attempt_store == AttemptStoreKind::Memory {
        let cleanup_store = attempts.clone();
        let cleanup_interval_secs = config.session.cleanup_interval_seconds;
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
            loop {
                interval.tick().await;
                let count = cleanup_store.purge_expired().await;
                if count > 0 {
                    tracing::debug!(purged_attempts = count, "Periodic login attempt cleanup");
                }
            }
        });
    }

    let app_state = Arc::new(AppState::new(
        Arc::new(oidc_client),
        Arc::new(UserRepository::new(db_pool)),
        attempts,
        config.session,
    ));

    let app = app::router(app_state, &config.static_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_address);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down");
}
