use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use log::{info, warn, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Root};
use log4rs::encode::pattern::PatternEncoder;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use manga_meta::app_state::AppState;
use manga_meta::cache::{CacheSet, FileCache};
use manga_meta::config::Config;
use manga_meta::fetch::{FetcherConfig, ResilientFetcher};
use manga_meta::models::{ListQuery, MangaListPage};
use manga_meta::proxy::ProxyManager;
use manga_meta::rate_limiter::SourceLimiters;
use manga_meta::sources::{jikan::Jikan, komiku::Komiku, mangadex::MangaDex, Capability};
use manga_meta::store::{sanitize, MetadataStore, RefreshOptions, StoreConfig};
use manga_meta::{scheduler, sources::MangaSource};

const SEARCH_FILE_TTL: Duration = Duration::from_secs(30 * 60);
const PAGES_FILE_TTL: Duration = Duration::from_secs(24 * 3600);

#[get("/api/manga")]
async fn list_manga(data: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    let page: MangaListPage = data.store.get_manga_list(&query.into_inner());
    HttpResponse::Ok().json(page)
}

#[get("/api/manga/{source}/{id}")]
async fn manga_detail(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (source, id) = path.into_inner();
    let cache_key = format!("mangaDetail_{}_{}", source, id);

    if let Some(detail) = data.caches.manga_detail.get(&cache_key) {
        return HttpResponse::Ok().json(detail);
    }

    if let Some(detail) = data.store.get_manga_detail(&source, &id) {
        data.caches.manga_detail.set(&cache_key, detail.clone());
        return HttpResponse::Ok().json(detail);
    }

    // Cold path: one live fetch, saved for every later request.
    if let Some(adapter) = data.store.adapter(&source) {
        if adapter.supports(Capability::Detail) {
            match adapter.manga_detail(&id).await {
                Ok(Some(raw)) => {
                    if let Some(detail) = data.store.save_manga_detail(&source, &raw).await {
                        data.caches.manga_detail.set(&cache_key, detail.clone());
                        return HttpResponse::Ok().json(detail);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("[api] Detail fetch {}/{} failed: {}", source, id, e),
            }
        }
    }

    HttpResponse::NotFound().json(json!({ "error": "Manga not found" }))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    #[serde(default = "default_all")]
    source: String,
}

fn default_all() -> String {
    "all".to_string()
}

#[get("/api/search")]
async fn search_manga(data: web::Data<AppState>, query: web::Query<SearchQuery>) -> impl Responder {
    let q = query.q.trim();
    if q.is_empty() {
        return HttpResponse::Ok().json(json!({ "items": [], "totalItems": 0 }));
    }
    let cache_key = format!("search_{}_{}", query.source, q.to_lowercase());

    if let Some(items) = data.caches.search.get(&cache_key) {
        let total = items.len();
        return HttpResponse::Ok().json(json!({ "items": items, "totalItems": total }));
    }
    if let Some(items) = data
        .file_cache
        .load::<Vec<manga_meta::models::MangaSummary>>(&cache_key)
        .await
    {
        data.caches.search.set(&cache_key, items.clone());
        let total = items.len();
        return HttpResponse::Ok().json(json!({ "items": items, "totalItems": total }));
    }

    let targets: Vec<String> = if query.source == "all" {
        data.store.known_sources()
    } else {
        vec![query.source.clone()]
    };

    let mut items = Vec::new();
    for source in &targets {
        let Some(adapter) = data.store.adapter(source) else {
            continue;
        };
        if !adapter.supports(Capability::Search) {
            continue;
        }
        match adapter.search(q).await {
            Ok(raw) => items.extend(sanitize::summaries_from_raw(source, &raw)),
            Err(e) => warn!("[api] Search on {} failed: {}", source, e),
        }
    }

    if !items.is_empty() {
        data.caches.search.set(&cache_key, items.clone());
        data.file_cache.save(&cache_key, &items, SEARCH_FILE_TTL).await;
    }
    let total = items.len();
    HttpResponse::Ok().json(json!({ "items": items, "totalItems": total }))
}

#[get("/api/chapters/{source}/{id}")]
async fn chapter_list(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (source, id) = path.into_inner();
    let cache_key = format!("chapters_{}_{}", source, id);

    if let Some(chapters) = data.caches.chapter_list.get(&cache_key) {
        return HttpResponse::Ok().json(json!({ "chapters": chapters }));
    }

    let chapters = match data.store.adapter(&source) {
        Some(adapter) if adapter.supports(Capability::Chapters) => {
            match adapter.chapters(&id).await {
                Ok(chapters) => chapters,
                Err(e) => {
                    warn!("[api] Chapters {}/{} failed: {}", source, id, e);
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    };

    if !chapters.is_empty() {
        data.caches.chapter_list.set(&cache_key, chapters.clone());
    }
    HttpResponse::Ok().json(json!({ "chapters": chapters }))
}

#[get("/api/pages/{source}/{id}")]
async fn chapter_pages(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (source, id) = path.into_inner();
    let cache_key = format!("chapterPages_{}_{}", source, id);

    if let Some(pages) = data.caches.chapter_pages.get(&cache_key) {
        return HttpResponse::Ok().json(json!({ "pages": pages }));
    }
    if let Some(pages) = data
        .file_cache
        .load::<Vec<manga_meta::models::ChapterPage>>(&cache_key)
        .await
    {
        data.caches.chapter_pages.set(&cache_key, pages.clone());
        return HttpResponse::Ok().json(json!({ "pages": pages }));
    }

    let pages = match data.store.adapter(&source) {
        Some(adapter) if adapter.supports(Capability::ChapterPages) => {
            match adapter.chapter_pages(&id).await {
                Ok(pages) => pages,
                Err(e) => {
                    warn!("[api] Pages {}/{} failed: {}", source, id, e);
                    Vec::new()
                }
            }
        }
        _ => Vec::new(),
    };

    if !pages.is_empty() {
        data.caches.chapter_pages.set(&cache_key, pages.clone());
        data.file_cache.save(&cache_key, &pages, PAGES_FILE_TTL).await;
    }
    HttpResponse::Ok().json(json!({ "pages": pages }))
}

#[post("/api/refresh/{source}")]
async fn trigger_refresh(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let source = path.into_inner();
    let sources = if source == "all" {
        data.store.known_sources()
    } else {
        vec![source]
    };
    for src in &sources {
        // Fire-and-forget; the handle is shared with any refresh already
        // in flight for the same source.
        let _ = data.store.request_refresh(src, RefreshOptions::default());
    }
    HttpResponse::Accepted().json(json!({ "status": "refresh scheduled", "sources": sources }))
}

#[get("/api/cache/stats")]
async fn cache_stats(data: web::Data<AppState>) -> impl Responder {
    let memory = data.caches.stats();
    let file = data.file_cache.stats().await;
    HttpResponse::Ok().json(json!({ "memory": memory, "file": file }))
}

#[post("/api/cache/clear")]
async fn clear_caches(data: web::Data<AppState>) -> impl Responder {
    data.caches.clear_all();
    data.file_cache.clear().await;
    info!("[api] Caches cleared");
    HttpResponse::Ok().json(json!({ "status": "cleared" }))
}

#[get("/api/proxies")]
async fn proxy_stats(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.proxies.stats())
}

#[get("/api/limits/{source}")]
async fn limiter_stats(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let source = path.into_inner();
    let per_source = data.limiters.stats(&source).await;
    let global = data.limiters.global_stats().await;
    HttpResponse::Ok().json(json!({ "source": per_source, "global": global }))
}

#[post("/api/proxies/reset")]
async fn reset_proxies(data: web::Data<AppState>) -> impl Responder {
    data.proxies.reset_failed();
    HttpResponse::Ok().json(json!({ "status": "reset" }))
}

fn init_logging() {
    if log4rs::init_file("log4rs.yml", Default::default()).is_ok() {
        return;
    }
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {t} - {m}{n}",
        )))
        .build();
    let config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info))
        .expect("console logging config");
    let _ = log4rs::init_config(config);
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let config = Config::load();
    let proxies = Arc::new(
        ProxyManager::new(&config.proxies, config.fetch_timeout())
            .expect("failed to build HTTP clients"),
    );
    let limiters = Arc::new(SourceLimiters::new(
        config.source_quotas(),
        config.global_quota(),
    ));
    let fetcher = Arc::new(
        ResilientFetcher::new(
            Arc::clone(&proxies),
            Arc::clone(&limiters),
            FetcherConfig {
                direct_retries: config.fetch.direct_retries,
                min_length: config.fetch.min_length,
                retry_delay: Duration::from_millis(config.fetch.retry_delay_ms),
                timeout: config.fetch_timeout(),
            },
        )
        .expect("failed to build fetcher"),
    );

    let store = MetadataStore::new(StoreConfig {
        data_dir: std::path::Path::new(&config.cache_dir).join("metadata"),
        max_size: config.refresh.max_store_size,
        stale_ttl: config.stale_ttl(),
        refresh_pages: config.refresh.pages,
        refresh_limit: config.refresh.limit,
        refresh_languages: config.refresh.languages.clone(),
    });
    store.register_source(Arc::new(MangaDex::new(Arc::clone(&fetcher))) as Arc<dyn MangaSource>);
    store.register_source(Arc::new(Komiku::new(Arc::clone(&fetcher))) as Arc<dyn MangaSource>);
    store.register_source(Arc::new(Jikan::new(Arc::clone(&fetcher))) as Arc<dyn MangaSource>);
    store.initialize().await;

    let data = web::Data::new(AppState {
        store,
        caches: Arc::new(CacheSet::new()),
        file_cache: Arc::new(FileCache::new(config.cache_dir.clone())),
        proxies,
        limiters,
        config: config.clone(),
    });

    scheduler::spawn(data.clone());

    info!("Starting server on {}", config.bind_addr);
    let bind_addr = config.bind_addr.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .service(list_manga)
            .service(manga_detail)
            .service(search_manga)
            .service(chapter_list)
            .service(chapter_pages)
            .service(trigger_refresh)
            .service(cache_stats)
            .service(clear_caches)
            .service(proxy_stats)
            .service(limiter_stats)
            .service(reset_proxies)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
