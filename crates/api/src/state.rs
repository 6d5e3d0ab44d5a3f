//! Shared application state for the Axum API server.

use std::sync::Arc;

use sqlx::PgPool;

use courier_common::config::AppConfig;
use courier_notifier::Dispatcher;
use courier_notifier::channels::TransportError;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            pool,
            config,
            dispatcher,
        }
    }

    /// Build state with a PostgreSQL-backed dispatcher and the transports
    /// selected by `config`.
    pub fn from_config(pool: PgPool, config: AppConfig) -> Result<Self, TransportError> {
        let dispatcher = Arc::new(Dispatcher::from_config(pool.clone(), &config)?);
        Ok(Self::new(pool, config, dispatcher))
    }
}
