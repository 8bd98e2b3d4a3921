//! # ska-api
//!
//! HTTP host layer for the Ska plugin host built on Axum.
//!
//! Provides the plugin admin endpoints, the filter-chain middleware around
//! the non-admin routes, the interceptor-chain middleware around the business
//! routes, and error mapping.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
