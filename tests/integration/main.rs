//! Integration tests for the Ska plugin host.

mod helpers;

mod activity_test;
mod admin_test;
mod budget_test;
mod drain_test;
