/// File cache tests
/// Round-trips, expiry with file removal, corruption handling, and stats,
/// all against temp directories.
use manga_meta::cache::FileCache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Payload {
    x: i32,
    name: String,
}

#[tokio::test]
async fn save_and_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    let payload = Payload {
        x: 1,
        name: "one".to_string(),
    };
    cache.save("key-1", &payload, Duration::from_secs(10)).await;

    let loaded: Payload = cache.load("key-1").await.unwrap();
    assert_eq!(loaded, payload);
}

#[tokio::test]
async fn unknown_key_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());
    assert!(cache.load::<Payload>("nope").await.is_none());
}

#[tokio::test]
async fn expired_entries_are_removed_on_read() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    cache
        .save("short-lived", &json!({"x": 1}), Duration::from_millis(1))
        .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(cache.load::<serde_json::Value>("short-lived").await.is_none());
    // The backing file is gone too.
    let stats = cache.stats().await;
    assert_eq!(stats.count, 0);
}

#[tokio::test]
async fn keys_are_sanitized_to_safe_filenames() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    cache
        .save("search:one piece?page=2", &json!({"ok": true}), Duration::from_secs(10))
        .await;
    let loaded: serde_json::Value = cache.load("search:one piece?page=2").await.unwrap();
    assert_eq!(loaded["ok"], true);

    let stats = cache.stats().await;
    assert_eq!(stats.count, 1);
    assert!(stats.files[0].file.ends_with(".json.gz"));
    assert!(!stats.files[0].file.contains(' '));
}

#[tokio::test]
async fn manga_keys_land_in_subdirectory() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    cache
        .save("mangaDetail_md_abc", &json!({"id": "abc"}), Duration::from_secs(10))
        .await;

    assert!(dir.path().join("manga").is_dir());
    let loaded: serde_json::Value = cache.load("mangaDetail_md_abc").await.unwrap();
    assert_eq!(loaded["id"], "abc");

    let stats = cache.stats().await;
    assert!(stats.files.iter().any(|f| f.file.starts_with("manga/")));
}

#[tokio::test]
async fn corrupt_file_degrades_to_miss() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    cache.save("victim", &json!({"x": 1}), Duration::from_secs(10)).await;
    // Truncate the gzip file mid-stream.
    let stats = cache.stats().await;
    let path = dir.path().join(&stats.files[0].file);
    tokio::fs::write(&path, b"\x1f\x8b garbage").await.unwrap();

    assert!(cache.load::<serde_json::Value>("victim").await.is_none());
}

#[tokio::test]
async fn clear_removes_everything_including_subdirectories() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    cache.save("plain", &json!({"a": 1}), Duration::from_secs(10)).await;
    cache.save("mangaList_x", &json!({"b": 2}), Duration::from_secs(10)).await;
    assert_eq!(cache.stats().await.count, 2);

    cache.clear().await;
    assert_eq!(cache.stats().await.count, 0);
    assert!(cache.load::<serde_json::Value>("plain").await.is_none());
    assert!(cache.load::<serde_json::Value>("mangaList_x").await.is_none());
}

#[tokio::test]
async fn overwriting_a_key_replaces_its_contents() {
    let dir = TempDir::new().unwrap();
    let cache = FileCache::new(dir.path());

    cache.save("k", &json!({"v": 1}), Duration::from_secs(10)).await;
    cache.save("k", &json!({"v": 2}), Duration::from_secs(10)).await;

    let loaded: serde_json::Value = cache.load("k").await.unwrap();
    assert_eq!(loaded["v"], 2);
    assert_eq!(cache.stats().await.count, 1);
}
