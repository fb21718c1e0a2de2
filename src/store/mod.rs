//! Metadata store: aggregation, staleness tracking, background refresh
//!
//! The store holds a bounded, deduplicated, merged collection of listing
//! records per source plus a shared detail map, persists both to disk
//! after every mutation, and serves filtered/sorted/paginated views.
//! Reads never block on scraping: a stale source gets a background
//! refresh kicked off fire-and-forget, and a completely cold store
//! answers immediately with an explicit "no data yet" result.
//!
//! Adapter failures at any stage degrade the refresh; they are logged
//! and never reach the query surface.

pub mod sanitize;

use crate::helpers::{
    apply_manga_filters, apply_manga_sort, calculate_total_pages, MangaFilters,
};
use crate::models::{
    ListQuery, MangaDetail, MangaListPage, MangaSummary, RawMangaDetail, RawMangaEntry,
};
use crate::sources::{Capability, ListRequest, MangaSource};
use chrono::Utc;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

const DETAILS_FILE: &str = "metadata_details.json";

/// Completion handle for an in-flight refresh. Cloneable so that every
/// caller interested in the same source awaits the same underlying work.
pub type RefreshHandle = Shared<BoxFuture<'static, ()>>;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Per-source item cap; oldest-by-recency entries are evicted first.
    pub max_size: usize,
    pub stale_ttl: Duration,
    pub refresh_pages: u32,
    pub refresh_limit: usize,
    /// Language targets for language-partitioned sources.
    pub refresh_languages: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("cache/metadata"),
            max_size: 5000,
            stale_ttl: Duration::from_secs(30 * 60),
            refresh_pages: 20,
            refresh_limit: 100,
            refresh_languages: vec!["en".to_string(), "id".to_string()],
        }
    }
}

/// Per-call overrides for refresh behavior.
#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    pub pages: Option<u32>,
    pub limit: Option<usize>,
    pub languages: Option<Vec<String>>,
    pub max_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// Epoch milliseconds of the last upsert, 0 when never updated.
    pub updated_at: i64,
    pub total_items: usize,
}

#[derive(Default)]
struct SourceListState {
    items: Vec<MangaSummary>,
    updated_at_ms: i64,
}

/// On-disk layout of one source's list file.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceListFile {
    source: String,
    updated_at: i64,
    items: Vec<MangaSummary>,
}

struct StoreInner {
    config: StoreConfig,
    adapters: RwLock<HashMap<String, Arc<dyn MangaSource>>>,
    lists: RwLock<HashMap<String, SourceListState>>,
    details: RwLock<HashMap<String, MangaDetail>>,
    refreshing: Mutex<HashMap<String, RefreshHandle>>,
    auto_refresh: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Cheap-to-clone handle; all clones share the same underlying state.
#[derive(Clone)]
pub struct MetadataStore {
    inner: Arc<StoreInner>,
}

impl MetadataStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                config,
                adapters: RwLock::new(HashMap::new()),
                lists: RwLock::new(HashMap::new()),
                details: RwLock::new(HashMap::new()),
                refreshing: Mutex::new(HashMap::new()),
                auto_refresh: Mutex::new(None),
            }),
        }
    }

    pub fn register_source(&self, adapter: Arc<dyn MangaSource>) {
        let name = adapter.name().to_string();
        self.inner
            .adapters
            .write()
            .unwrap()
            .insert(name.clone(), adapter);
        self.inner
            .lists
            .write()
            .unwrap()
            .entry(name)
            .or_default();
    }

    pub fn adapter(&self, source: &str) -> Option<Arc<dyn MangaSource>> {
        self.inner.adapters.read().unwrap().get(source).cloned()
    }

    /// All sources the store knows about: registered adapters plus any
    /// source that has stored data.
    pub fn known_sources(&self) -> Vec<String> {
        let mut set = BTreeSet::new();
        for name in self.inner.adapters.read().unwrap().keys() {
            set.insert(name.clone());
        }
        for name in self.inner.lists.read().unwrap().keys() {
            set.insert(name.clone());
        }
        set.into_iter().collect()
    }

    /// Load persisted lists and details from disk. Unreadable or corrupt
    /// files leave the affected source empty; startup never fails here.
    pub async fn initialize(&self) {
        let sources = self.known_sources();
        for source in &sources {
            self.load_source_from_disk(source).await;
        }
        self.load_details_from_disk().await;
        info!(
            "[store] Initialized with {} sources, {} details",
            sources.len(),
            self.inner.details.read().unwrap().len()
        );
    }

    async fn load_source_from_disk(&self, source: &str) {
        let path = self.inner.config.data_dir.join(format!("metadata_{}.json", source));
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<SourceListFile>(&bytes) {
                Ok(parsed) => SourceListState {
                    items: parsed.items,
                    updated_at_ms: parsed.updated_at,
                },
                Err(e) => {
                    warn!("[store] Corrupt list file for {}: {}", source, e);
                    SourceListState::default()
                }
            },
            Err(_) => SourceListState::default(),
        };
        self.inner
            .lists
            .write()
            .unwrap()
            .insert(source.to_string(), state);
    }

    async fn load_details_from_disk(&self) {
        let path = self.inner.config.data_dir.join(DETAILS_FILE);
        let loaded = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<HashMap<String, MangaDetail>>(&bytes)
                .unwrap_or_default(),
            Err(_) => HashMap::new(),
        };
        *self.inner.details.write().unwrap() = loaded;
    }

    async fn save_source_to_disk(&self, source: &str) {
        let payload = {
            let lists = self.inner.lists.read().unwrap();
            let Some(state) = lists.get(source) else {
                return;
            };
            SourceListFile {
                source: source.to_string(),
                updated_at: state.updated_at_ms,
                items: state.items.clone(),
            }
        };
        let dir = self.inner.config.data_dir.clone();
        let path = dir.join(format!("metadata_{}.json", source));
        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            let bytes = serde_json::to_vec(&payload)?;
            tokio::fs::write(&path, bytes).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = result {
            // In-memory state stays authoritative; a later write may succeed.
            error!("[store] Failed to persist list for {}: {}", source, e);
        }
    }

    async fn save_details_to_disk(&self) {
        let snapshot = self.inner.details.read().unwrap().clone();
        let dir = self.inner.config.data_dir.clone();
        let path = dir.join(DETAILS_FILE);
        let result = async {
            tokio::fs::create_dir_all(&dir).await?;
            let bytes = serde_json::to_vec(&snapshot)?;
            tokio::fs::write(&path, bytes).await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        if let Err(e) = result {
            error!("[store] Failed to persist details: {}", e);
        }
    }

    /// Sanitize and merge `entries` into `source`'s list. This is the only
    /// mutation path for list data: idempotent, merge-safe, bounded. The
    /// merged list is built fully before the stored state is replaced, so
    /// readers never observe a partial merge.
    pub async fn upsert_list(
        &self,
        source: &str,
        entries: &[RawMangaEntry],
        opts: &RefreshOptions,
    ) {
        let now = Utc::now();
        let sanitized: Vec<_> = entries
            .iter()
            .filter_map(|raw| sanitize::sanitize_entry(raw, source, now))
            .collect();
        if sanitized.is_empty() {
            return;
        }

        let max_size = opts.max_size.unwrap_or(self.inner.config.max_size);
        {
            let mut lists = self.inner.lists.write().unwrap();
            let state = lists.entry(source.to_string()).or_default();

            let mut by_id: HashMap<String, MangaSummary> = state
                .items
                .drain(..)
                .map(|item| (item.id.clone(), item))
                .collect();
            for entry in sanitized {
                let id = entry.id.clone();
                let merged = sanitize::merge_entry(by_id.remove(&id), entry, source, now);
                by_id.insert(id, merged);
            }

            let mut merged: Vec<MangaSummary> = by_id.into_values().collect();
            merged.sort_by(|a, b| recency_ms(b).cmp(&recency_ms(a)));
            merged.truncate(max_size);

            state.items = merged;
            state.updated_at_ms = now.timestamp_millis();
        }

        self.save_source_to_disk(source).await;
    }

    /// Group pre-combined entries by their own `source` field and upsert
    /// each group, so mixed batches are attributed correctly.
    pub async fn ingest_combined_list(&self, entries: &[RawMangaEntry]) {
        let mut grouped: HashMap<String, Vec<RawMangaEntry>> = HashMap::new();
        for entry in entries {
            let Some(source) = entry.source.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            grouped
                .entry(source.to_string())
                .or_default()
                .push(entry.clone());
        }
        for (source, items) in grouped {
            self.upsert_list(&source, &items, &RefreshOptions::default())
                .await;
        }
    }

    /// Snapshot of one source's stored list, or of every source combined.
    pub fn get_stored_list(&self, source: &str) -> Vec<MangaSummary> {
        let lists = self.inner.lists.read().unwrap();
        if source == "all" {
            let mut combined = Vec::new();
            for state in lists.values() {
                combined.extend(state.items.iter().cloned());
            }
            combined
        } else {
            lists
                .get(source)
                .map(|state| state.items.clone())
                .unwrap_or_default()
        }
    }

    pub fn meta(&self, source: &str) -> Option<ListMeta> {
        let lists = self.inner.lists.read().unwrap();
        lists.get(source).map(|state| ListMeta {
            updated_at: state.updated_at_ms,
            total_items: state.items.len(),
        })
    }

    pub fn is_stale(&self, source: &str) -> bool {
        self.is_stale_at(source, Utc::now().timestamp_millis())
    }

    /// Staleness against an explicit clock value (epoch milliseconds);
    /// `is_stale` is this with the real clock.
    pub fn is_stale_at(&self, source: &str, now_ms: i64) -> bool {
        let lists = self.inner.lists.read().unwrap();
        match lists.get(source) {
            Some(state) if state.updated_at_ms > 0 => {
                now_ms - state.updated_at_ms > self.inner.config.stale_ttl.as_millis() as i64
            }
            _ => true,
        }
    }

    /// Serve a filtered/sorted/paginated view. Stale sources get a
    /// background refresh kicked off without blocking; a fully cold store
    /// answers immediately with `has_data: false` while refreshes for all
    /// requested sources start behind the scenes.
    pub fn get_manga_list(&self, query: &ListQuery) -> MangaListPage {
        let target_sources = if query.source == "all" {
            self.known_sources()
        } else {
            vec![query.source.clone()]
        };

        let mut combined = Vec::new();
        let mut has_data = false;
        for source in &target_sources {
            let data = self.get_stored_list(source);
            if !data.is_empty() {
                combined.extend(data);
                has_data = true;
            }
            if self.is_stale(source) && self.adapter(source).is_some() {
                let _ = self.request_refresh(source, RefreshOptions::default());
            }
        }

        if !has_data {
            for source in &target_sources {
                if self.adapter(source).is_some() {
                    let _ = self.request_refresh(source, RefreshOptions::default());
                }
            }
            return MangaListPage::empty();
        }

        let filters = MangaFilters {
            genre: query.genre.clone(),
            status: query.status.clone(),
            kind: query.kind.clone(),
            language: query.language.clone(),
        };
        let filtered = apply_manga_filters(combined, &filters);
        let sorted = apply_manga_sort(filtered, &query.sort);

        let total_items = sorted.len();
        let limit = query.limit.max(1);
        let total_pages = calculate_total_pages(total_items, limit);
        let start = query.page.saturating_sub(1) * limit;
        let items: Vec<MangaSummary> = sorted.into_iter().skip(start).take(limit).collect();

        MangaListPage {
            has_data: !items.is_empty(),
            total_items,
            total_pages,
            cache_type: "metadata".to_string(),
            items,
        }
    }

    pub fn get_manga_detail(&self, source: &str, id: &str) -> Option<MangaDetail> {
        if source.is_empty() || id.is_empty() {
            return None;
        }
        let key = detail_key(source, id);
        self.inner.details.read().unwrap().get(&key).cloned()
    }

    /// Sanitize, store, and persist a detail record. Details are only
    /// refreshed by explicit saves, never by staleness.
    pub async fn save_manga_detail(
        &self,
        source: &str,
        detail: &RawMangaDetail,
    ) -> Option<MangaDetail> {
        let sanitized = sanitize::sanitize_detail(detail, source, Utc::now())?;
        let key = detail_key(source, &sanitized.id);
        self.inner
            .details
            .write()
            .unwrap()
            .insert(key, sanitized.clone());
        self.save_details_to_disk().await;
        Some(sanitized)
    }

    /// Start a refresh for `source`, or join the one already running.
    /// Concurrent callers all receive the same handle, so a thundering
    /// herd of stale reads produces exactly one scrape sequence. The
    /// returned handle may be dropped freely; the refresh is driven by a
    /// spawned task either way.
    pub fn request_refresh(&self, source: &str, opts: RefreshOptions) -> RefreshHandle {
        if self.adapter(source).is_none() {
            return futures::future::ready(()).boxed().shared();
        }

        let mut refreshing = self.inner.refreshing.lock().unwrap();
        if let Some(handle) = refreshing.get(source) {
            return handle.clone();
        }

        let store = self.clone();
        let source_owned = source.to_string();
        let handle: RefreshHandle = async move {
            store.refresh_source(&source_owned, &opts).await;
            store
                .inner
                .refreshing
                .lock()
                .unwrap()
                .remove(&source_owned);
        }
        .boxed()
        .shared();

        refreshing.insert(source.to_string(), handle.clone());
        drop(refreshing);

        tokio::spawn(handle.clone());
        handle
    }

    /// Pull up to `pages` pages from the adapter, accumulating entries.
    /// An empty or short page ends the loop (the source is exhausted); a
    /// failed page ends the loop but keeps everything gathered so far.
    /// All accumulated entries land in a single `upsert_list`.
    pub async fn refresh_source(&self, source: &str, opts: &RefreshOptions) {
        let Some(adapter) = self.adapter(source) else {
            return;
        };
        let pages = opts.pages.unwrap_or(self.inner.config.refresh_pages).max(1);
        let limit = opts.limit.unwrap_or(self.inner.config.refresh_limit).max(1);

        let mut aggregated: Vec<RawMangaEntry> = Vec::new();

        if adapter.supports(Capability::LanguagePartitioned) {
            let languages = opts
                .languages
                .clone()
                .unwrap_or_else(|| self.inner.config.refresh_languages.clone());
            for language in languages {
                self.fetch_pages(&*adapter, source, pages, limit, Some(language), &mut aggregated)
                    .await;
            }
        } else {
            self.fetch_pages(&*adapter, source, pages, limit, None, &mut aggregated)
                .await;
        }

        if !aggregated.is_empty() {
            info!(
                "[store] Refresh {} gathered {} entries",
                source,
                aggregated.len()
            );
            self.upsert_list(source, &aggregated, opts).await;
        }
    }

    async fn fetch_pages(
        &self,
        adapter: &dyn MangaSource,
        source: &str,
        pages: u32,
        limit: usize,
        language: Option<String>,
        aggregated: &mut Vec<RawMangaEntry>,
    ) {
        for page in 1..=pages {
            let request = ListRequest {
                page,
                limit,
                language: language.clone(),
            };
            match adapter.manga_list(&request).await {
                Ok(result) => {
                    if result.is_empty() {
                        break;
                    }
                    let count = result.len();
                    aggregated.extend(result);
                    if count < limit {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        "[store] Failed to refresh {}{} page {}: {}",
                        source,
                        language
                            .as_deref()
                            .map(|l| format!(" ({})", l))
                            .unwrap_or_default(),
                        page,
                        e
                    );
                    break;
                }
            }
        }
    }

    /// Refresh every known source in turn, awaiting each. This is the
    /// full-catalog helper behind the auto-refresh timer, distinct from
    /// the non-blocking per-request trigger.
    pub async fn refresh_all(&self, opts: &RefreshOptions) {
        for source in self.known_sources() {
            self.request_refresh(&source, opts.clone()).await;
        }
    }

    /// Fire one immediate full refresh and then repeat on `interval`.
    /// Re-scheduling cancels the previous timer.
    pub fn schedule_auto_refresh(&self, opts: RefreshOptions, interval: Duration) {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            store.refresh_all(&opts).await;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                ticker.tick().await;
                store.refresh_all(&opts).await;
            }
        });
        let mut slot = self.inner.auto_refresh.lock().unwrap();
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    pub fn refresh_in_flight(&self, source: &str) -> bool {
        self.inner.refreshing.lock().unwrap().contains_key(source)
    }
}

fn detail_key(source: &str, id: &str) -> String {
    format!("{}::{}", source, id)
}

// Recency for store ordering: ingestion time first, payload time as the
// fallback for records that predate the lastFetched field.
fn recency_ms(item: &MangaSummary) -> i64 {
    chrono::DateTime::parse_from_rfc3339(&item.last_fetched)
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(&item.updated_at))
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}
