// Library interface for manga_meta
// This allows tests and external crates to use the aggregation components

pub mod app_state;
pub mod cache;
pub mod config;
pub mod fetch;
pub mod helpers;
pub mod models;
pub mod proxy;
pub mod rate_limiter;
pub mod scheduler;
pub mod sources;
pub mod store;
