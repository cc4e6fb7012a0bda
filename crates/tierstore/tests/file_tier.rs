// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end tests with an in-memory cache in front of a JSON file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tick::Clock;
use tierstore::{KeyPattern, MemoryBackend, ReadStrategy, StorageManager, StorageType, SyncOptions, WriteStrategy};
use tierstore_file::FileBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Attempt {
    quiz: u32,
    answers: Vec<String>,
    correct: bool,
}

fn attempt(quiz: u32) -> Attempt {
    Attempt {
        quiz,
        answers: vec!["b".to_string(), "d".to_string()],
        correct: quiz % 2 == 0,
    }
}

async fn manager(dir: &tempfile::TempDir, clock: Clock) -> StorageManager<MemoryBackend, FileBackend> {
    let file = FileBackend::open(dir.path().join("progress.json"), clock.clone())
        .await
        .expect("open failed");
    StorageManager::builder(clock).memory().persistent(file).build()
}

#[tokio::test]
async fn persisted_values_survive_a_restart() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let clock = Clock::new_frozen();

    {
        let manager = manager(&dir, clock.clone()).await;
        let written = manager.set("important_quiz_1", &attempt(1), None, WriteStrategy::Hybrid).await;
        assert!(written.is_success());
        assert_eq!(written.storage_type(), StorageType::Hybrid);
    }

    let restarted = manager(&dir, clock).await;
    let first = restarted.get("important_quiz_1", |_: &Attempt| true, ReadStrategy::CacheFirst).await;
    assert_eq!(first.data(), Some(&attempt(1)));
    assert_eq!(first.storage_type(), StorageType::Persistent);

    // The write-back is detached on this runtime; give it a chance to land.
    let second = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            tokio::task::yield_now().await;
            let read = restarted.get("important_quiz_1", |_: &Attempt| true, ReadStrategy::CacheFirst).await;
            if read.storage_type() == StorageType::Cache {
                break read;
            }
        }
    })
    .await
    .expect("write-back never reached the cache");
    assert_eq!(second.data(), Some(&attempt(1)));
}

#[tokio::test]
async fn cache_only_writes_are_lost_on_restart_unless_synced() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let clock = Clock::new_frozen();

    {
        let manager = manager(&dir, clock.clone()).await;
        let _ = manager.set("important_quiz_2", &attempt(2), None, WriteStrategy::Cache).await;
        let _ = manager.set("scratch", &attempt(3), None, WriteStrategy::Cache).await;

        let synced = manager.sync(&SyncOptions::to_server()).await;
        assert!(synced.is_success());
    }

    let restarted = manager(&dir, clock).await;
    let kept = restarted.exists("important_quiz_2").await;
    assert_eq!(kept.data(), Some(&true));
    assert_eq!(kept.storage_type(), StorageType::Persistent);

    let lost = restarted.exists("scratch").await;
    assert_eq!(lost.data(), Some(&false));
}

#[tokio::test]
async fn invalidate_and_keys_span_both_tiers() {
    let dir = tempfile::tempdir().expect("tempdir failed");
    let manager = manager(&dir, Clock::new_frozen()).await;

    for quiz in 1..=3 {
        let _ = manager.set(&format!("quiz_{quiz}"), &attempt(quiz), None, WriteStrategy::Hybrid).await;
    }
    let _ = manager.set("profile", "ada", None, WriteStrategy::Persistent).await;

    let keys = manager.get_keys().await.into_data().expect("keys");
    assert_eq!(keys, vec!["profile", "quiz_1", "quiz_2", "quiz_3"]);

    let pattern = KeyPattern::glob("quiz_*").expect("valid pattern");
    let removed = manager.invalidate(&pattern).await;
    assert_eq!(removed.data(), Some(&6));

    let keys = manager.get_keys().await.into_data().expect("keys");
    assert_eq!(keys, vec!["profile"]);
}
