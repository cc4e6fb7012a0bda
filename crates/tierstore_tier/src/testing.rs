// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Mock backend implementation for testing.
//!
//! This module provides `MockBackend`, a configurable in-memory backend that
//! records all operations and supports failure, stall, and delay injection for testing
//! error and ordering paths.

use std::{collections::BTreeMap, sync::Arc, task::Poll, time::Duration};

use parking_lot::Mutex;

use crate::{CleanupOptions, CleanupReport, Error, KeyPattern, StorageBackend, StorageValue, TierStats};

/// Recorded backend operation with full context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendOp {
    /// A get operation was performed with the given key.
    Get(String),
    /// A set operation was performed.
    Set {
        /// The key that was written.
        key: String,
        /// The value that was written.
        value: StorageValue,
        /// The TTL requested by the caller.
        ttl: Option<Duration>,
    },
    /// A delete operation was performed with the given key.
    Delete(String),
    /// An exists check was performed with the given key.
    Exists(String),
    /// A clear operation was performed.
    Clear,
    /// The key set was listed.
    Keys,
    /// An invalidation was performed with the given pattern source.
    Invalidate(String),
    /// Statistics were requested.
    Stats,
    /// A cleanup pass was requested.
    Cleanup(CleanupOptions),
}

impl BackendOp {
    /// Returns `true` for operations that modify the backend.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Self::Set { .. } | Self::Delete(_) | Self::Clear | Self::Invalidate(_) | Self::Cleanup(_)
        )
    }
}

type OpPredicate = Box<dyn Fn(&BackendOp) -> bool + Send + Sync>;

fn predicate_matches(slot: &Mutex<Option<OpPredicate>>, op: &BackendOp) -> bool {
    slot.lock().as_ref().is_some_and(|predicate| predicate(op))
}

/// Returns `Pending` once, waking itself, so other futures polled alongside get a turn.
async fn yield_once() {
    let mut yielded = false;
    std::future::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await;
}

/// A configurable mock backend for testing.
///
/// This backend stores values in memory and can be configured to fail operations on
/// demand, making it useful for testing fallback and error handling paths. All
/// operations are recorded for later verification. Clones share state.
///
/// TTLs are recorded but never enforced; use [`expire`](Self::expire) to simulate an
/// entry running out of time.
///
/// Operations complete on their first poll unless [`stall_when`](Self::stall_when) or
/// [`delay_when`](Self::delay_when) says otherwise.
///
/// # Examples
///
/// ```
/// use tierstore_tier::testing::{BackendOp, MockBackend};
/// use tierstore_tier::{StorageBackend, StorageValue};
/// # futures::executor::block_on(async {
///
/// let backend = MockBackend::new();
///
/// backend.set("key", StorageValue::from(42), None).await.unwrap();
/// assert_eq!(backend.get("key").await.unwrap(), Some(StorageValue::from(42)));
///
/// // Fail only reads of a specific key
/// backend.fail_when(|op| matches!(op, BackendOp::Get(k) if k == "forbidden"));
/// assert!(backend.get("forbidden").await.is_err());
/// assert!(backend.get("key").await.is_ok());
/// # });
/// ```
pub struct MockBackend {
    name: &'static str,
    data: Arc<Mutex<BTreeMap<String, (StorageValue, Option<Duration>)>>>,
    operations: Arc<Mutex<Vec<BackendOp>>>,
    fail_when: Arc<Mutex<Option<OpPredicate>>>,
    stall_when: Arc<Mutex<Option<OpPredicate>>>,
    delay_when: Arc<Mutex<Option<(OpPredicate, u32)>>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("name", &self.name)
            .field("data", &self.data)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("stall_when", &self.stall_when.lock().is_some())
            .field("delay_when", &self.delay_when.lock().is_some())
            .finish()
    }
}

impl Clone for MockBackend {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            data: Arc::clone(&self.data),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            stall_when: Arc::clone(&self.stall_when),
            delay_when: Arc::clone(&self.delay_when),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Creates a new empty mock backend named `"mock"`.
    #[must_use]
    pub fn new() -> Self {
        Self::named("mock")
    }

    /// Creates a new empty mock backend with the given name.
    #[must_use]
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            data: Arc::new(Mutex::new(BTreeMap::new())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            stall_when: Arc::new(Mutex::new(None)),
            delay_when: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a mock backend with pre-populated data.
    #[must_use]
    pub fn with_data<I, K>(name: &'static str, data: I) -> Self
    where
        I: IntoIterator<Item = (K, StorageValue)>,
        K: Into<String>,
    {
        let backend = Self::named(name);
        backend
            .data
            .lock()
            .extend(data.into_iter().map(|(k, v)| (k.into(), (v, None))));
        backend
    }

    /// Returns the number of entries in the backend.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the backend contains the given key.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.lock().contains_key(key)
    }

    /// Returns the stored value for `key` without recording an operation.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<StorageValue> {
        self.data.lock().get(key).map(|(value, _)| value.clone())
    }

    /// Returns the TTL the entry under `key` was stored with.
    #[must_use]
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        self.data.lock().get(key).and_then(|(_, ttl)| *ttl)
    }

    /// Drops the entry under `key` as if its TTL had elapsed.
    pub fn expire(&self, key: &str) {
        self.data.lock().remove(key);
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// The predicate receives the operation and returns `true` if it should fail.
    /// Failed operations are still recorded.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&BackendOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Makes every operation fail.
    pub fn fail_all(&self) {
        self.fail_when(|_| true);
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Makes matching operations never complete.
    ///
    /// A stalled operation is recorded before it stalls.
    pub fn stall_when<F>(&self, predicate: F)
    where
        F: Fn(&BackendOp) -> bool + Send + Sync + 'static,
    {
        *self.stall_when.lock() = Some(Box::new(predicate));
    }

    /// Makes matching operations return `Pending` `polls` times before they run.
    ///
    /// Each pending poll wakes the task again, so no timer or runtime is needed. Under
    /// `futures::join!` the other branch finishes first.
    pub fn delay_when<F>(&self, predicate: F, polls: u32)
    where
        F: Fn(&BackendOp) -> bool + Send + Sync + 'static,
    {
        *self.delay_when.lock() = Some((Box::new(predicate), polls));
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<BackendOp> {
        self.operations.lock().clone()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    async fn check(&self, op: BackendOp) -> Result<(), Error> {
        let fail = predicate_matches(&self.fail_when, &op);
        let stall = predicate_matches(&self.stall_when, &op);
        let delay = match &*self.delay_when.lock() {
            Some((predicate, polls)) if predicate(&op) => *polls,
            _ => 0,
        };
        let label = format!("{op:?}");
        self.operations.lock().push(op);

        if stall {
            std::future::pending::<()>().await;
        }
        for _ in 0..delay {
            yield_once().await;
        }
        if fail {
            return Err(Error::caused_by(format!("mock {}: {label} failed", self.name)));
        }
        Ok(())
    }
}

impl StorageBackend for MockBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn get(&self, key: &str) -> Result<Option<StorageValue>, Error> {
        self.check(BackendOp::Get(key.to_string())).await?;
        Ok(self.peek(key))
    }

    async fn set(&self, key: &str, value: StorageValue, ttl: Option<Duration>) -> Result<(), Error> {
        self.check(BackendOp::Set {
            key: key.to_string(),
            value: value.clone(),
            ttl,
        }).await?;
        self.data.lock().insert(key.to_string(), (value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        self.check(BackendOp::Delete(key.to_string())).await?;
        Ok(self.data.lock().remove(key).is_some())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.check(BackendOp::Clear).await?;
        self.data.lock().clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, Error> {
        self.check(BackendOp::Keys).await?;
        Ok(self.data.lock().keys().cloned().collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, Error> {
        self.check(BackendOp::Exists(key.to_string())).await?;
        Ok(self.contains_key(key))
    }

    async fn invalidate(&self, pattern: &KeyPattern) -> Result<u64, Error> {
        self.check(BackendOp::Invalidate(pattern.as_str().to_string())).await?;
        let mut data = self.data.lock();
        let before = data.len();
        data.retain(|key, _| !pattern.matches(key));
        Ok((before - data.len()) as u64)
    }

    async fn stats(&self) -> Result<TierStats, Error> {
        self.check(BackendOp::Stats).await?;
        let data = self.data.lock();
        let size = data.values().map(|(value, _)| value.size_bytes()).sum();
        Ok(TierStats::new(self.name, data.len() as u64, size))
    }

    async fn cleanup(&self, options: &CleanupOptions) -> Result<CleanupReport, Error> {
        self.check(BackendOp::Cleanup(options.clone())).await?;
        Ok(CleanupReport {
            removed: 0,
            remaining: self.entry_count() as u64,
        })
    }
}
