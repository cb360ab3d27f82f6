//! Shared application state for the Axum API server.

use sqlx::PgPool;

use courier_broker::redis::RedisBroker;
use courier_common::config::AppConfig;
use courier_common::status::PgStatusStore;
use courier_router::{MessageRouter, RedisDedup};

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub router: MessageRouter<RedisBroker, RedisDedup, PgStatusStore>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        router: MessageRouter<RedisBroker, RedisDedup, PgStatusStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            pool,
            router,
            config,
        }
    }
}
