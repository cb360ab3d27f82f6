//! Courier delivery service binary: one consumer task per channel queue plus
//! the delay-queue consumer that re-injects scheduled retries.

use std::time::Duration;

use courier_broker::redis::RedisBroker;
use courier_common::clock::SystemClock;
use courier_common::config::AppConfig;
use courier_common::db::create_pool;
use courier_common::redis_pool::create_redis_pool;
use courier_common::status::PgStatusStore;
use courier_common::types::Channel;

use courier_delivery::{DelayReinjector, DeliveryWorker, RetryPolicy, RetryScheduler, WebhookAdapter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "courier_delivery=info,courier_broker=info".into()),
        )
        .json()
        .init();

    tracing::info!("Courier delivery service starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to the status store
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Connect to the broker
    let redis = create_redis_pool(&config.redis_url).await?;
    let broker = RedisBroker::new(redis);

    let store = PgStatusStore::new(pool);
    let adapter = WebhookAdapter::from_config(&config);
    let scheduler = RetryScheduler::new(RetryPolicy {
        max_retries: config.max_retries,
        initial_backoff_ms: config.initial_backoff_ms,
    });
    let delivery_timeout = Duration::from_millis(config.delivery_timeout_ms);

    // One consumer task per channel queue
    for channel in Channel::ALL {
        let worker = DeliveryWorker::new(
            broker.clone(),
            store.clone(),
            adapter.clone(),
            SystemClock,
            scheduler,
            delivery_timeout,
        );
        tokio::spawn(async move {
            if let Err(e) = worker.run(channel.queue()).await {
                tracing::error!(channel = %channel, error = %e, "Delivery worker exited with error");
            }
        });
    }

    // One consumer task for the delay queue
    let reinjector = DelayReinjector::new(broker.clone(), SystemClock);
    tokio::spawn(async move {
        if let Err(e) = reinjector.run().await {
            tracing::error!(error = %e, "Delay-queue consumer exited with error");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping gracefully...");

    Ok(())
}
