use discount_engine::config::{AppConfig, StorageBackend};
use discount_engine::{create_router, db, AppState, Backends};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG controls verbosity, e.g. RUST_LOG=discount_engine=debug,tower_http=info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("discount_engine=info,tower_http=info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Discount Engine - Starting...");

    let config = AppConfig::from_env().expect("Invalid configuration");

    let backends = match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set in environment");

            tracing::info!("Connecting to database...");
            let pool = db::create_pool(database_url, config.db_max_connections)
                .await
                .expect("Failed to create database pool");

            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            Backends::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown");
            Backends::in_memory()
        }
    };

    let state = AppState::from_config(backends, &config);
    let metrics = state.evaluator.metrics().clone();
    let app = create_router(state);

    let addr = config.bind_address();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Discount Engine is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    metrics.log_summary();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
