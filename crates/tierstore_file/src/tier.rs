// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Persistent storage tier backed by a JSON document.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use jiff::Timestamp;
use tick::Clock;
use tierstore_tier::{CleanupOptions, CleanupReport, Error, KeyPattern, StorageBackend, StorageValue, TierStats};
use tokio::sync::Mutex;

use crate::document::{Document, Record};

#[derive(Debug)]
struct Inner {
    name: &'static str,
    path: PathBuf,
    clock: Clock,
    document: Mutex<Document>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// A durable storage tier that keeps every entry in one JSON file.
///
/// The whole document is held in memory. Every mutation produces the next document,
/// writes it to disk atomically, and only then becomes visible to readers. A failed
/// write therefore leaves both the file and the in-memory state untouched.
///
/// Mutations are serialized; reads only wait for a mutation that is already in flight.
/// Clones share the same document.
///
/// # Examples
///
/// ```
/// use tick::Clock;
/// use tierstore_file::FileBackend;
/// use tierstore_tier::{StorageBackend, StorageValue};
///
/// # async fn example(clock: Clock) -> Result<(), tierstore_tier::Error> {
/// let store = FileBackend::open("data/progress.json", clock).await?;
///
/// store.set("level", StorageValue::from(3), None).await?;
/// assert_eq!(store.get("level").await?, Some(StorageValue::from(3)));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileBackend {
    inner: Arc<Inner>,
}

impl FileBackend {
    /// Opens the store at `path`, loading any entries it already holds.
    ///
    /// A missing file is treated as an empty store and is created by the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, is not a valid store
    /// document, or was written by an incompatible format version.
    pub async fn open(path: impl Into<PathBuf>, clock: Clock) -> Result<Self, Error> {
        Self::open_named("file", path, clock).await
    }

    /// Like [`open`](Self::open), reporting `name` in statistics.
    ///
    /// # Errors
    ///
    /// Same as [`open`](Self::open).
    pub async fn open_named(name: &'static str, path: impl Into<PathBuf>, clock: Clock) -> Result<Self, Error> {
        let path = path.into();
        let document = Document::load(&path).await?;
        tracing::debug!(
            storage.backend = name,
            storage.path = %path.display(),
            storage.entries = document.entries.len(),
            "persistent store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                name,
                path,
                clock,
                document: Mutex::new(document),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        })
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn now(&self) -> Timestamp {
        self.inner.clock.system_time_as()
    }

    async fn live_record(&self, key: &str) -> Option<Record> {
        let now = self.now();
        let document = self.inner.document.lock().await;
        document.entries.get(key).filter(|record| !record.is_expired(now)).cloned()
    }

    /// Applies `mutate` to a copy of the document, persists the copy, and publishes it.
    async fn commit<R>(&self, mutate: impl FnOnce(&mut Document) -> R) -> Result<R, Error> {
        let mut document = self.inner.document.lock().await;
        let mut next = document.clone();
        let outcome = mutate(&mut next);
        next.persist(&self.inner.path).await?;
        *document = next;
        Ok(outcome)
    }
}

impl StorageBackend for FileBackend {
    fn name(&self) -> &'static str {
        self.inner.name
    }

    async fn get(&self, key: &str) -> Result<Option<StorageValue>, Error> {
        let record = self.live_record(key).await;
        let counter = if record.is_some() { &self.inner.hits } else { &self.inner.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(record.map(|record| record.value))
    }

    async fn set(&self, key: &str, value: StorageValue, ttl: Option<Duration>) -> Result<(), Error> {
        let stored_at = self.now();
        let expires_at = match ttl {
            Some(ttl) => Some(stored_at.checked_add(ttl).map_err(Error::from_message)?),
            None => None,
        };

        let record = Record {
            value,
            stored_at,
            expires_at,
        };
        self.commit(|document| {
            document.entries.insert(key.to_string(), record);
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let now = self.now();
        if !self.inner.document.lock().await.entries.contains_key(key) {
            return Ok(false);
        }

        self.commit(|document| document.entries.remove(key).is_some_and(|record| !record.is_expired(now)))
            .await
    }

    async fn clear(&self) -> Result<(), Error> {
        self.commit(|document| document.entries.clear()).await
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let now = self.now();
        let document = self.inner.document.lock().await;
        Ok(document
            .entries
            .iter()
            .filter(|(_, record)| !record.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.live_record(key).await.is_some())
    }

    async fn invalidate(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        let now = self.now();
        let matching = {
            let document = self.inner.document.lock().await;
            document.entries.keys().filter(|key| pattern.matches(key)).count()
        };
        if matching == 0 {
            return Ok(0);
        }

        self.commit(|document| {
            let mut removed = 0;
            document.entries.retain(|key, record| {
                let matched = pattern.matches(key);
                if matched && !record.is_expired(now) {
                    removed += 1;
                }
                !matched
            });
            removed
        })
        .await
    }

    async fn stats(&self) -> Result<TierStats, Error> {
        let now = self.now();
        let document = self.inner.document.lock().await;
        let (entries, size_bytes) = document
            .entries
            .values()
            .filter(|record| !record.is_expired(now))
            .fold((0, 0), |(count, size), record| (count + 1, size + record.value.size_bytes()));

        Ok(TierStats {
            backend: self.inner.name.to_string(),
            entries,
            size_bytes,
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
        })
    }

    async fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport, Error> {
        let now = self.now();
        let doomed = |record: &Record| record.is_expired(now) || options.max_age.is_some_and(|age| record.is_older_than(now, age));

        let (total, removed) = {
            let document = self.inner.document.lock().await;
            let removed = document.entries.values().filter(|record| doomed(record)).count() as u64;
            (document.entries.len() as u64, removed)
        };

        if removed == 0 || options.dry_run {
            return Ok(CleanupReport {
                removed,
                remaining: total - removed,
            });
        }

        let report = self
            .commit(|document| {
                let before = document.entries.len();
                document.entries.retain(|_, record| !doomed(record));
                CleanupReport {
                    removed: (before - document.entries.len()) as u64,
                    remaining: document.entries.len() as u64,
                }
            })
            .await?;
        tracing::debug!(
            storage.backend = self.inner.name,
            storage.removed = report.removed,
            "persistent store cleaned up"
        );
        Ok(report)
    }
}
