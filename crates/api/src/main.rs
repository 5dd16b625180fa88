use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aat_api::config::ServerConfig;
use aat_api::router::build_app_router;
use aat_api::state::AppState;
use aat_api::storage::BlobStorage;
use aat_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        ws_require_auth = config.realtime.require_auth,
        ws_outbound_buffer = config.realtime.outbound_buffer,
        "Loaded server configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = aat_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    aat_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    aat_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Blob storage ---
    tokio::fs::create_dir_all(&config.storage_root)
        .await
        .expect("Failed to create STORAGE_ROOT");
    let storage = Arc::new(BlobStorage::new(config.storage_root.clone()));
    tracing::info!(root = %config.storage_root.display(), "Blob storage ready");

    // --- Real-time fan-out ---
    let registry = Arc::new(ws::ConnectionRegistry::with_outbound_buffer(
        config.realtime.outbound_buffer,
    ));
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&registry),
        Duration::from_secs(config.realtime.heartbeat_interval_secs),
    );
    let annotation_store: Arc<dyn ws::AnnotationStore> =
        Arc::new(ws::PgAnnotationStore::new(pool.clone()));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        registry: Arc::clone(&registry),
        annotation_store,
        storage,
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

    // Upgraded sockets outlive their HTTP connection; close them on the signal.
    let shutdown_registry = Arc::clone(&registry);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let ws_count = shutdown_registry.connection_count();
            tracing::info!(ws_count, "Closing WebSocket connections");
            shutdown_registry.shutdown_all();
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    heartbeat_handle.abort();
    let _ = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_secs),
        heartbeat_handle,
    )
    .await;
    tracing::info!("Heartbeat task stopped");

    // Sessions that registered between the signal and listener close.
    if registry.connection_count() > 0 {
        registry.shutdown_all();
    }

    tracing::info!("Graceful shutdown complete");
}

/// Install the global subscriber.
///
/// `RUST_LOG` controls filtering; `LOG_FORMAT=json` switches to one JSON
/// object per line for log shippers.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aat_api=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
