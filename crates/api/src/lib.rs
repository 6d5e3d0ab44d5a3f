//! Courier HTTP API: accounts and notification routes over Axum.

pub mod middleware;
pub mod routes;
pub mod state;
