//! Shared application state for the Actix-web server
//!
//! Constructed once at startup and handed to every handler through
//! `web::Data`. All components are owned here explicitly instead of
//! living in module-level globals, which also keeps them testable with
//! fresh instances per test.

use crate::cache::{CacheSet, FileCache};
use crate::config::Config;
use crate::proxy::ProxyManager;
use crate::rate_limiter::SourceLimiters;
use crate::store::MetadataStore;
use std::sync::Arc;

pub struct AppState {
    pub store: MetadataStore,
    pub caches: Arc<CacheSet>,
    pub file_cache: Arc<FileCache>,
    pub proxies: Arc<ProxyManager>,
    pub limiters: Arc<SourceLimiters>,
    pub config: Config,
}
