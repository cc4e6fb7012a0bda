// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `FileBackend`.

use std::time::Duration;

use jiff::Timestamp;
use tick::{Clock, ClockControl};
use tierstore_file::FileBackend;
use tierstore_tier::{CleanupOptions, KeyPattern, StorageBackend, StorageValue};

async fn open_in(dir: &tempfile::TempDir, clock: Clock) -> FileBackend {
    FileBackend::open(dir.path().join("store.json"), clock)
        .await
        .expect("open failed")
}

#[tokio::test]
async fn missing_file_opens_empty() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let store = open_in(&dir, Clock::new_frozen()).await;

    assert!(store.keys().await.expect("keys failed").is_empty());
    assert!(!store.path().exists());
}

#[tokio::test]
async fn values_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let clock = Clock::new_frozen();
    let date: Timestamp = "2024-06-01T12:00:00Z".parse().expect("valid timestamp");

    {
        let store = open_in(&dir, clock.clone()).await;
        store.set("level", StorageValue::from(3), None).await.expect("set failed");
        store.set("finished_at", StorageValue::from(date), None).await.expect("set failed");
    }

    let reopened = open_in(&dir, clock).await;
    assert_eq!(reopened.get("level").await.expect("get failed"), Some(StorageValue::from(3)));
    assert_eq!(
        reopened.get("finished_at").await.expect("get failed"),
        Some(StorageValue::Date(date))
    );
}

#[tokio::test]
async fn write_leaves_no_temporary_file() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let store = open_in(&dir, Clock::new_frozen()).await;

    store.set("k", StorageValue::from("v"), None).await.expect("set failed");

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read_dir failed")
        .map(|entry| entry.expect("entry failed").file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from("store.json")]);
}

#[tokio::test]
async fn nested_directories_are_created() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("a").join("b").join("store.json");
    let store = FileBackend::open(&path, Clock::new_frozen()).await.expect("open failed");

    store.set("k", StorageValue::from(1), None).await.expect("set failed");

    assert!(path.exists());
}

#[tokio::test]
async fn corrupt_file_fails_to_open() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("store.json");
    std::fs::write(&path, "not json").expect("write failed");

    FileBackend::open(&path, Clock::new_frozen())
        .await
        .expect_err("open should fail");
}

#[tokio::test]
async fn failed_write_keeps_previous_state() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let path = dir.path().join("store.json");
    let store = FileBackend::open(&path, Clock::new_frozen()).await.expect("open failed");
    store.set("kept", StorageValue::from(1), None).await.expect("set failed");

    // A directory in place of the target makes the rename fail.
    std::fs::remove_file(&path).expect("remove failed");
    std::fs::create_dir(&path).expect("create_dir failed");

    store.set("lost", StorageValue::from(2), None).await.expect_err("set should fail");

    assert_eq!(store.keys().await.expect("keys failed"), vec!["kept".to_string()]);
    assert!(!dir.path().join("store.json.tmp").exists());
}

#[tokio::test]
async fn expired_entries_are_hidden_and_cleaned() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let control = ClockControl::new();
    let store = open_in(&dir, control.to_clock()).await;

    store
        .set("short", StorageValue::from(1), Some(Duration::from_secs(300)))
        .await
        .expect("set failed");
    store.set("long", StorageValue::from(2), None).await.expect("set failed");
    control.advance(Duration::from_secs(301));

    assert!(!store.exists("short").await.expect("exists failed"));
    assert_eq!(store.keys().await.expect("keys failed"), vec!["long".to_string()]);

    let dry = store
        .cleanup(&CleanupOptions::new().dry_run())
        .await
        .expect("cleanup failed");
    assert_eq!((dry.removed, dry.remaining), (1, 1));

    let report = store.cleanup(&CleanupOptions::new()).await.expect("cleanup failed");
    assert_eq!((report.removed, report.remaining), (1, 1));

    let reopened = open_in(&dir, control.to_clock()).await;
    let again = reopened.cleanup(&CleanupOptions::new()).await.expect("cleanup failed");
    assert_eq!(again.removed, 0);
}

#[tokio::test]
async fn cleanup_older_than_removes_aged_entries() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let control = ClockControl::new();
    let store = open_in(&dir, control.to_clock()).await;

    store.set("old", StorageValue::from(1), None).await.expect("set failed");
    control.advance(Duration::from_secs(3600));
    store.set("new", StorageValue::from(2), None).await.expect("set failed");

    let report = store
        .cleanup(&CleanupOptions::new().older_than(Duration::from_secs(60)))
        .await
        .expect("cleanup failed");

    assert_eq!(report.removed, 1);
    assert_eq!(store.keys().await.expect("keys failed"), vec!["new".to_string()]);
}

#[tokio::test]
async fn delete_and_invalidate_persist() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let clock = Clock::new_frozen();
    let store = open_in(&dir, clock.clone()).await;
    for key in ["quiz_1", "quiz_2", "important_progress"] {
        store.set(key, StorageValue::from(key), None).await.expect("set failed");
    }

    assert!(store.delete("important_progress").await.expect("delete failed"));
    assert!(!store.delete("important_progress").await.expect("delete failed"));
    let removed = store
        .invalidate(&KeyPattern::glob("quiz_*").expect("valid pattern"))
        .await
        .expect("invalidate failed");
    assert_eq!(removed, 2);

    let reopened = open_in(&dir, clock).await;
    assert!(reopened.keys().await.expect("keys failed").is_empty());
}

#[tokio::test]
async fn clear_empties_the_file() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let clock = Clock::new_frozen();
    let store = open_in(&dir, clock.clone()).await;
    store.set("a", StorageValue::from(1), None).await.expect("set failed");

    store.clear().await.expect("clear failed");

    let reopened = open_in(&dir, clock).await;
    assert!(reopened.keys().await.expect("keys failed").is_empty());
}

#[tokio::test]
async fn stats_count_hits_and_misses() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let store = FileBackend::open_named("durable", dir.path().join("s.json"), Clock::new_frozen())
        .await
        .expect("open failed");
    store.set("k", StorageValue::from(true), None).await.expect("set failed");

    let _ = store.get("k").await.expect("get failed");
    let _ = store.get("nope").await.expect("get failed");

    let stats = store.stats().await.expect("stats failed");
    assert_eq!(stats.backend, "durable");
    assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
    assert_eq!(stats.size_bytes, StorageValue::from(true).size_bytes());
}
