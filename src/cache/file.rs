//! Durable gzip-compressed file cache
//!
//! Survives process restarts; that is its entire point. Any read problem,
//! expiry, truncation, or corruption, degrades to a cache miss and never
//! reaches the caller as an error. Keys recognizable as manga entries get
//! their own subdirectory to keep the main cache directory small.

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, error};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MANGA_SUBDIR: &str = "manga";

#[derive(Serialize, Deserialize)]
struct Envelope {
    data: Value,
    /// Epoch milliseconds.
    expiry: i64,
    created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCacheEntry {
    pub file: String,
    pub size: u64,
    pub modified: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileCacheStats {
    pub count: usize,
    pub files: Vec<FileCacheEntry>,
}

pub struct FileCache {
    root: PathBuf,
    manga_dir: PathBuf,
}

impl FileCache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        let root = root.into();
        let manga_dir = root.join(MANGA_SUBDIR);
        Self { root, manga_dir }
    }

    /// Filesystem-safe filename for a cache key.
    fn filename(key: &str) -> String {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}.json.gz", safe)
    }

    fn dir_for_key(&self, key: &str) -> &Path {
        if key.to_lowercase().starts_with("manga") {
            &self.manga_dir
        } else {
            &self.root
        }
    }

    fn path_for_key(&self, key: &str) -> PathBuf {
        self.dir_for_key(key).join(Self::filename(key))
    }

    /// Persist `data` under `key`. Failures are logged, never returned;
    /// the in-memory layers stay authoritative.
    pub async fn save<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) {
        if let Err(e) = self.try_save(key, data, ttl).await {
            error!("[file-cache] Error saving {}: {}", key, e);
        }
    }

    async fn try_save<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        ttl: Duration,
    ) -> Result<(), std::io::Error> {
        let dir = self.dir_for_key(key).to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let now = Utc::now().timestamp_millis();
        let envelope = Envelope {
            data: serde_json::to_value(data)?,
            expiry: now + ttl.as_millis() as i64,
            created_at: now,
        };
        let serialized = serde_json::to_vec(&envelope)?;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let compressed = encoder.finish()?;

        // Write to a sibling temp file first so readers never see a
        // half-written entry.
        let path = self.path_for_key(key);
        let tmp = path.with_extension("gz.tmp");
        tokio::fs::write(&tmp, &compressed).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Load and decode the entry for `key`, or `None` if absent, expired,
    /// or unreadable. Expired files are removed on the way out.
    pub async fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for_key(key);
        let envelope = match self.read_envelope(&path).await {
            Some(envelope) => envelope,
            None => return None,
        };

        if Utc::now().timestamp_millis() > envelope.expiry {
            let _ = tokio::fs::remove_file(&path).await;
            let _ = tokio::fs::remove_file(legacy_path(&path)).await;
            debug!("[file-cache] Expired entry removed: {}", key);
            return None;
        }

        serde_json::from_value(envelope.data).ok()
    }

    async fn read_envelope(&self, path: &Path) -> Option<Envelope> {
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let mut decoder = GzDecoder::new(bytes.as_slice());
                let mut decompressed = String::new();
                if decoder.read_to_string(&mut decompressed).is_ok() {
                    if let Ok(envelope) = serde_json::from_str::<Envelope>(&decompressed) {
                        return Some(envelope);
                    }
                }
                // Corrupt entry: degrade to a miss and drop the file.
                let _ = tokio::fs::remove_file(path).await;
                None
            }
            // Fallback for legacy uncompressed entries.
            Err(_) => {
                let legacy = legacy_path(path);
                let contents = tokio::fs::read_to_string(&legacy).await.ok()?;
                serde_json::from_str::<Envelope>(&contents).ok()
            }
        }
    }

    pub async fn has_valid(&self, key: &str) -> bool {
        self.load::<Value>(key).await.is_some()
    }

    /// Remove every cache file, including the manga subdirectory.
    pub async fn clear(&self) {
        if let Err(e) = self.try_clear().await {
            error!("[file-cache] Error clearing cache: {}", e);
        }
    }

    async fn try_clear(&self) -> Result<(), std::io::Error> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(_) => return Ok(()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                let mut nested = tokio::fs::read_dir(&path).await?;
                while let Some(file) = nested.next_entry().await? {
                    let _ = tokio::fs::remove_file(file.path()).await;
                }
            } else {
                let _ = tokio::fs::remove_file(&path).await;
            }
        }
        Ok(())
    }

    /// File count, sizes, and mtimes for admin inspection.
    pub async fn stats(&self) -> FileCacheStats {
        let mut files = Vec::new();
        collect_stats(&self.root, None, &mut files).await;
        collect_stats(&self.manga_dir, Some(MANGA_SUBDIR), &mut files).await;
        FileCacheStats {
            count: files.len(),
            files,
        }
    }
}

fn legacy_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .trim_end_matches(".gz")
        .to_string();
    path.with_file_name(name)
}

async fn collect_stats(dir: &Path, prefix: Option<&str>, out: &mut Vec<FileCacheEntry>) {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return,
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        let file = match prefix {
            Some(p) => format!("{}/{}", p, name),
            None => name,
        };
        out.push(FileCacheEntry {
            file,
            size: meta.len(),
            modified: meta.modified().ok().map(chrono::DateTime::from),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_filesystem_safe() {
        assert_eq!(
            FileCache::filename("search:one piece?page=2"),
            "search_one_piece_page_2.json.gz"
        );
        assert_eq!(FileCache::filename("plain-key_1"), "plain-key_1.json.gz");
    }

    #[test]
    fn manga_keys_route_to_subdirectory() {
        let cache = FileCache::new("/tmp/fc-test");
        assert!(cache.dir_for_key("mangaList_komiku_1").ends_with("manga"));
        assert!(cache.dir_for_key("MangaDetail_x").ends_with("manga"));
        assert!(!cache.dir_for_key("search_naruto").ends_with("manga"));
    }
}
