pub mod file;
pub mod memory;

pub use file::{FileCache, FileCacheStats};
pub use memory::{Cache, CacheStats};

use crate::models::{ChapterPage, MangaDetail, MangaListPage, MangaSummary, RawChapter};
use log::debug;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// The five independently configured cache instances. Chapter pages cache
/// longest since images almost never change; list/search freshness matters
/// more, so those turn over fastest.
pub struct CacheSet {
    pub manga_list: Cache<MangaListPage>,
    pub manga_detail: Cache<MangaDetail>,
    pub chapter_list: Cache<Vec<RawChapter>>,
    pub chapter_pages: Cache<Vec<ChapterPage>>,
    pub search: Cache<Vec<MangaSummary>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheSetStats {
    pub manga_list: CacheStats,
    pub manga_detail: CacheStats,
    pub chapter_list: CacheStats,
    pub chapter_pages: CacheStats,
    pub search: CacheStats,
}

impl CacheSet {
    pub fn new() -> Self {
        Self {
            manga_list: Cache::new(Duration::from_secs(3600), 50),
            manga_detail: Cache::new(Duration::from_secs(7200), 100),
            chapter_list: Cache::new(Duration::from_secs(3600), 80),
            chapter_pages: Cache::new(Duration::from_secs(86400), 100),
            search: Cache::new(Duration::from_secs(1800), 50),
        }
    }

    pub fn cleanup_all(&self) -> usize {
        self.manga_list.cleanup()
            + self.manga_detail.cleanup()
            + self.chapter_list.cleanup()
            + self.chapter_pages.cleanup()
            + self.search.cleanup()
    }

    pub fn clear_all(&self) {
        self.manga_list.clear();
        self.manga_detail.clear();
        self.chapter_list.clear();
        self.chapter_pages.clear();
        self.search.clear();
    }

    pub fn stats(&self) -> CacheSetStats {
        CacheSetStats {
            manga_list: self.manga_list.stats(),
            manga_detail: self.manga_detail.stats(),
            chapter_list: self.chapter_list.stats(),
            chapter_pages: self.chapter_pages.stats(),
            search: self.search.stats(),
        }
    }

    /// Background sweep for expired entries across all instances.
    pub fn spawn_cleanup(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let caches = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // the first tick fires immediately
            loop {
                ticker.tick().await;
                let removed = caches.cleanup_all();
                debug!("[cache] Cleanup removed {} expired entries", removed);
            }
        })
    }
}

impl Default for CacheSet {
    fn default() -> Self {
        Self::new()
    }
}
