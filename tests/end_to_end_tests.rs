/// End-to-end refresh cycle against a mock adapter: pagination, early
/// stop on exhaustion, partial-failure degradation, and the resulting
/// store state.
use async_trait::async_trait;
use manga_meta::models::RawMangaEntry;
use manga_meta::sources::{Capability, ListRequest, MangaSource, SourceError};
use manga_meta::store::{MetadataStore, RefreshOptions, StoreConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn entries(prefix: &str, count: usize) -> Vec<RawMangaEntry> {
    (0..count)
        .map(|i| RawMangaEntry {
            id: Some(format!("{}-{}", prefix, i)),
            title: Some(format!("Manga {}", i)),
            ..Default::default()
        })
        .collect()
}

struct PagedSource {
    pages: Vec<Result<Vec<RawMangaEntry>, String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl MangaSource for PagedSource {
    fn name(&self) -> &'static str {
        "x"
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::List]
    }

    async fn manga_list(&self, req: &ListRequest) -> Result<Vec<RawMangaEntry>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.pages.get(req.page.saturating_sub(1) as usize) {
            Some(Ok(items)) => Ok(items.clone()),
            Some(Err(message)) => Err(SourceError::parse("page fetch", message)),
            None => Ok(Vec::new()),
        }
    }
}

fn store_in(dir: &TempDir) -> MetadataStore {
    MetadataStore::new(StoreConfig {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    })
}

#[tokio::test]
async fn refresh_stops_after_empty_page_and_stores_everything() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let adapter = Arc::new(PagedSource {
        pages: vec![Ok(entries("a", 100)), Ok(Vec::new())],
        calls: AtomicUsize::new(0),
    });
    store.register_source(adapter.clone() as Arc<dyn MangaSource>);

    store
        .refresh_source(
            "x",
            &RefreshOptions {
                pages: Some(5),
                limit: Some(100),
                ..Default::default()
            },
        )
        .await;

    // Page 1 was full (100 == limit), page 2 was empty; pages 3-5 skipped.
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.get_stored_list("x").len(), 100);
    assert_eq!(store.meta("x").unwrap().total_items, 100);
}

#[tokio::test]
async fn refresh_stops_early_on_short_page() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let adapter = Arc::new(PagedSource {
        pages: vec![Ok(entries("a", 40)), Ok(entries("b", 40))],
        calls: AtomicUsize::new(0),
    });
    store.register_source(adapter.clone() as Arc<dyn MangaSource>);

    store
        .refresh_source(
            "x",
            &RefreshOptions {
                pages: Some(5),
                limit: Some(100),
                ..Default::default()
            },
        )
        .await;

    // 40 < limit means the source is exhausted after one page.
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_stored_list("x").len(), 40);
}

#[tokio::test]
async fn failed_page_keeps_earlier_pages() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let adapter = Arc::new(PagedSource {
        pages: vec![
            Ok(entries("a", 100)),
            Ok(entries("b", 100)),
            Err("connection reset".to_string()),
            Ok(entries("d", 100)),
        ],
        calls: AtomicUsize::new(0),
    });
    store.register_source(adapter.clone() as Arc<dyn MangaSource>);

    store
        .refresh_source(
            "x",
            &RefreshOptions {
                pages: Some(10),
                limit: Some(100),
                ..Default::default()
            },
        )
        .await;

    // Pages 1-2 survive; the failure on page 3 stops the loop without
    // discarding what was already gathered, and page 4 is never fetched.
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.get_stored_list("x").len(), 200);
}

#[tokio::test]
async fn refresh_with_no_results_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let adapter = Arc::new(PagedSource {
        pages: vec![Err("blocked".to_string())],
        calls: AtomicUsize::new(0),
    });
    store.register_source(adapter as Arc<dyn MangaSource>);

    store.refresh_source("x", &RefreshOptions::default()).await;

    assert!(store.get_stored_list("x").is_empty());
    assert!(store.is_stale("x"));
}
