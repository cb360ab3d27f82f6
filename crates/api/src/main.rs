//! Courier API server binary entrypoint.

use std::net::SocketAddr;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use courier_broker::redis::RedisBroker;
use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_common::redis_pool::create_redis_pool;
use courier_common::status::PgStatusStore;
use courier_router::{DuplicateDetector, MessageRouter, RedisDedup};

use courier_api::routes::create_router;
use courier_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("courier_api=debug,courier_router=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Courier API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Create Redis connection
    let redis = create_redis_pool(&config.redis_url).await?;

    // Wire the router: broker + dedup detector + status store
    let broker = RedisBroker::new(redis.clone());
    let detector = DuplicateDetector::new(
        RedisDedup::new(redis),
        Duration::from_secs(config.dedup_ttl_secs),
    );
    let store = PgStatusStore::new(pool.clone());
    let router = MessageRouter::new(broker, detector, store);

    // Build application state
    let state = AppState::new(pool, router, config.clone());

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
