//! HTTP handlers.

pub mod business;
pub mod health;
pub mod plugins;
