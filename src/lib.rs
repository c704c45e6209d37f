pub mod app;
pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod error;
pub mod master;
pub mod order_portal;
pub mod output;
pub mod reconcile;
pub mod reports;
pub mod sources;
pub mod statusdb;
pub mod store;
