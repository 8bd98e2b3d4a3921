//! # ska-core
//!
//! Core crate for the Ska plugin host. Contains the configuration schemas
//! and the unified error system shared by the host, the plugin runtime,
//! the HTTP layer and the CLI.
//!
//! This crate has **no** internal dependencies on other Ska crates.

pub mod config;
pub mod error;
pub mod result;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;
