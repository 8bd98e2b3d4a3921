//! HTTP middleware.

pub mod hooks;
pub mod logging;
