use crate::app_state::AppState;
use crate::store::RefreshOptions;
use actix_web::web;
use std::time::Duration;

const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Start the background work: one immediate catalog refresh plus the
/// recurring auto-refresh timer, and the periodic cache sweep.
pub fn spawn(data: web::Data<AppState>) {
    data.store.schedule_auto_refresh(
        RefreshOptions {
            pages: Some(data.config.refresh.pages),
            limit: Some(data.config.refresh.limit),
            languages: Some(data.config.refresh.languages.clone()),
            max_size: Some(data.config.refresh.max_store_size),
        },
        data.config.refresh_interval(),
    );

    let _ = data.caches.spawn_cleanup(CACHE_CLEANUP_INTERVAL);
}
