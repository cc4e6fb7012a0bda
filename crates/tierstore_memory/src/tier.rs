// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory storage tier implementation using moka.
//!
//! This module provides a volatile tier backed by the moka crate, which offers
//! high-performance concurrent caching with capacity-based eviction. Expiry is
//! tracked per entry against the injected clock.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, SystemTime},
};

use moka::future::Cache;
use tick::Clock;
use tierstore_tier::{CleanupOptions, CleanupReport, Error, StorageBackend, StorageValue, TierStats};

use crate::builder::MemoryBackendBuilder;

#[derive(Clone, Debug)]
struct Entry {
    value: StorageValue,
    stored_at: SystemTime,
    expires_at: Option<SystemTime>,
}

impl Entry {
    fn is_expired(&self, now: SystemTime) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn is_older_than(&self, now: SystemTime, age: Duration) -> bool {
        now.duration_since(self.stored_at).is_ok_and(|elapsed| elapsed > age)
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// A volatile storage tier backed by moka.
///
/// This backend provides:
/// - Concurrent access with high performance
/// - Automatic eviction based on capacity
/// - Per-entry TTLs evaluated against a [`Clock`]
/// - Hit and miss counters reported through [`stats`](StorageBackend::stats)
///
/// Expired entries are never returned. They are dropped lazily when read, and in bulk by
/// [`cleanup`](StorageBackend::cleanup). Clones share the same storage.
///
/// # Examples
///
/// ```
/// use tick::Clock;
/// use tierstore_memory::MemoryBackend;
/// use tierstore_tier::{StorageBackend, StorageValue};
///
/// # fn example(clock: Clock) {
/// # futures::executor::block_on(async {
/// let cache = MemoryBackend::new(clock);
///
/// cache.set("key", StorageValue::from("value"), None).await?;
/// assert!(cache.exists("key").await?);
/// # Ok::<(), tierstore_tier::Error>(())
/// # }).unwrap();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: &'static str,
    inner: Cache<String, Entry>,
    clock: Clock,
    default_ttl: Option<Duration>,
    counters: Arc<Counters>,
}

impl MemoryBackend {
    /// Creates a new unbounded in-memory backend.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self::builder(clock).build()
    }

    /// Creates a new in-memory backend holding at most `max_capacity` entries.
    #[must_use]
    pub fn with_capacity(clock: Clock, max_capacity: u64) -> Self {
        Self::builder(clock).max_capacity(max_capacity).build()
    }

    /// Creates a new builder for configuring an in-memory backend.
    #[must_use]
    pub fn builder(clock: Clock) -> MemoryBackendBuilder {
        MemoryBackendBuilder::new(clock)
    }

    pub(crate) fn from_builder(builder: MemoryBackendBuilder) -> Self {
        let mut moka_builder = Cache::builder().name(builder.name);

        if let Some(capacity) = builder.max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = builder.initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        Self {
            name: builder.name,
            inner: moka_builder.build(),
            clock: builder.clock,
            default_ttl: builder.default_ttl,
            counters: Arc::default(),
        }
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        let now = self.clock.system_time();
        self.inner.iter().filter(|(_, entry)| !entry.is_expired(now)).count() as u64
    }

    /// Returns `true` when the backend holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn live_entry(&self, key: &str) -> Option<Entry> {
        let entry = self.inner.get(key).await?;
        if entry.is_expired(self.clock.system_time()) {
            self.inner.invalidate(key).await;
            return None;
        }
        Some(entry)
    }
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> Result<Option<StorageValue>, Error> {
        let entry = self.live_entry(key).await;
        let counter = if entry.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(entry.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: StorageValue, ttl: Option<Duration>) -> Result<(), Error> {
        let stored_at = self.clock.system_time();
        let expires_at = match ttl.or(self.default_ttl) {
            Some(ttl) => Some(
                stored_at
                    .checked_add(ttl)
                    .ok_or_else(|| Error::from_message(format!("TTL of {ttl:?} overflows the clock")))?,
            ),
            None => None,
        };

        self.inner
            .insert(
                key.to_string(),
                Entry {
                    value,
                    stored_at,
                    expires_at,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        let removed = self.inner.remove(key).await;
        Ok(removed.is_some_and(|entry| !entry.is_expired(self.clock.system_time())))
    }

    async fn clear(&self) -> Result<(), Error> {
        let keys: Vec<Arc<String>> = self.inner.iter().map(|(key, _)| key).collect();
        for key in keys {
            self.inner.invalidate(key.as_str()).await;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        let now = self.clock.system_time();
        Ok(self
            .inner
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        Ok(self.live_entry(key).await.is_some())
    }

    async fn stats(&self) -> Result<TierStats, Error> {
        let now = self.clock.system_time();
        let (entries, size_bytes) = self
            .inner
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .fold((0, 0), |(count, size), (_, entry)| (count + 1, size + entry.value.size_bytes()));

        Ok(TierStats {
            backend: self.name.to_string(),
            entries,
            size_bytes,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
        })
    }

    async fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport, Error> {
        let now = self.clock.system_time();
        let mut total = 0;
        let mut doomed = Vec::new();

        for (key, entry) in self.inner.iter() {
            total += 1;
            let aged_out = options.max_age.is_some_and(|age| entry.is_older_than(now, age));
            if entry.is_expired(now) || aged_out {
                doomed.push(key);
            }
        }

        let removed = doomed.len() as u64;
        if !options.dry_run {
            for key in doomed {
                self.inner.invalidate(key.as_str()).await;
            }
        }

        Ok(CleanupReport {
            removed,
            remaining: total - removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    #[test]
    fn entry_expiry_is_inclusive_of_deadline() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let entry = Entry {
            value: StorageValue::Null,
            stored_at: now,
            expires_at: Some(now + Duration::from_secs(5)),
        };

        assert!(!entry.is_expired(now + Duration::from_secs(4)));
        assert!(entry.is_expired(now + Duration::from_secs(5)));
    }

    #[test]
    fn entry_age_is_strictly_greater() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let entry = Entry {
            value: StorageValue::Null,
            stored_at: now,
            expires_at: None,
        };

        assert!(!entry.is_older_than(now + Duration::from_secs(10), Duration::from_secs(10)));
        assert!(entry.is_older_than(now + Duration::from_secs(11), Duration::from_secs(10)));
    }

    #[test]
    fn expired_read_counts_as_miss_and_drops_entry() {
        block_on(async {
            let control = ClockControl::new();
            let cache = MemoryBackend::new(control.to_clock());

            cache
                .set("k", StorageValue::from(1), Some(Duration::from_secs(1)))
                .await
                .expect("set failed");
            control.advance(Duration::from_secs(2));

            assert_eq!(cache.get("k").await.expect("get failed"), None);
            let stats = cache.stats().await.expect("stats failed");
            assert_eq!((stats.hits, stats.misses, stats.entries), (0, 1, 0));
        });
    }
}
