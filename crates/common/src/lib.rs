//! Shared configuration, database helpers, error type and domain types.

pub mod config;
pub mod db;
pub mod error;
pub mod types;
