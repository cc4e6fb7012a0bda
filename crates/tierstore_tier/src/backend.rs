// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The core trait for storage backends.
//!
//! [`StorageBackend`] defines the interface that both the cache tier and the persistent
//! tier implement. The coordination layer in `tierstore` composes two of them and adds
//! read/write strategies, synchronization, and metrics on top.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::{CleanupOptions, CleanupReport, Error, KeyPattern, StorageValue, TierStats};

/// Trait for storage tier implementations.
///
/// `get`, `set`, `delete`, `clear`, and `keys` are required. The remaining operations have
/// default implementations built on top of them:
/// - `exists`: a `get` that discards the value
/// - `invalidate`: lists keys and deletes every match
/// - `stats`: counts keys, without size information
/// - `cleanup`: removes nothing, for tiers that do not track expiry
///
/// Backends that know better (for example because they track TTLs) should override them.
#[cfg_attr(
    any(test, feature = "dynamic-backend"),
    dynosaur::dynosaur(pub(crate) DynStorageBackend = dyn(box) StorageBackend, bridge(none))
)]
pub trait StorageBackend: Send + Sync {
    /// Returns a short, static name identifying this backend in logs and statistics.
    fn name(&self) -> &'static str;

    /// Gets the value stored under `key`, or `None` when absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<StorageValue>, Error>> + Send;

    /// Stores `value` under `key`, optionally expiring after `ttl`.
    fn set(&self, key: &str, value: StorageValue, ttl: Option<Duration>) -> impl Future<Output = Result<(), Error>> + Send;

    /// Removes `key`, returning `true` when an entry was actually removed.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Removes every entry.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Lists the keys of all live entries.
    fn keys(&self) -> impl Future<Output = Result<Vec<String>, Error>> + Send;

    /// Returns `true` when a live entry exists for `key`.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        async move { Ok(self.get(key).await?.is_some()) }
    }

    /// Removes every entry whose key matches `pattern`, returning how many were removed.
    fn invalidate(&self, pattern: &KeyPattern) -> impl Future<Output = Result<u64, Error>> + Send {
        async move {
            let mut removed = 0;
            for key in self.keys().await? {
                if pattern.matches(&key) && self.delete(&key).await? {
                    removed += 1;
                }
            }
            Ok(removed)
        }
    }

    /// Returns native statistics for this tier.
    fn stats(&self) -> impl Future<Output = Result<TierStats, Error>> + Send {
        async move {
            let keys = self.keys().await?;
            Ok(TierStats::new(self.name(), keys.len() as u64, 0))
        }
    }

    /// Removes expired (and, per `options`, aged-out) entries.
    fn cleanup(&self, options: &CleanupOptions) -> impl Future<Output = Result<CleanupReport, Error>> + Send {
        let _ = options;
        async move {
            let remaining = self.keys().await?.len() as u64;
            Ok(CleanupReport { removed: 0, remaining })
        }
    }
}

/// Typed reads on top of any [`StorageBackend`].
///
/// This trait is implemented for every backend automatically.
pub trait StorageBackendExt: StorageBackend {
    /// Gets the value under `key` decoded as `T` and accepted by `validator`.
    ///
    /// A value that does not decode as `T`, or that `validator` rejects, is reported as
    /// `Ok(None)`, exactly like a missing key.
    ///
    /// # Examples
    ///
    /// ```
    /// # #[cfg(feature = "test-util")]
    /// # fn main() {
    /// use tierstore_tier::{StorageBackend, StorageBackendExt, StorageValue};
    /// use tierstore_tier::testing::MockBackend;
    /// # futures::executor::block_on(async {
    ///
    /// let backend = MockBackend::new();
    /// backend.set("score", StorageValue::from(42), None).await?;
    ///
    /// let score: Option<u32> = backend.get_validated("score", |v: &u32| *v > 10).await?;
    /// assert_eq!(score, Some(42));
    ///
    /// let rejected: Option<u32> = backend.get_validated("score", |v: &u32| *v > 100).await?;
    /// assert_eq!(rejected, None);
    /// # Ok::<(), tierstore_tier::Error>(())
    /// # }).unwrap();
    /// # }
    /// # #[cfg(not(feature = "test-util"))]
    /// # fn main() {}
    /// ```
    fn get_validated<T, F>(&self, key: &str, validator: F) -> impl Future<Output = Result<Option<T>, Error>> + Send
    where
        T: DeserializeOwned + Send,
        F: Fn(&T) -> bool + Send;
}

impl<B> StorageBackendExt for B
where
    B: StorageBackend + ?Sized,
{
    async fn get_validated<T, F>(&self, key: &str, validator: F) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Send,
        F: Fn(&T) -> bool + Send,
    {
        Ok(self.get(key).await?.and_then(|value| value.decode_validated(validator)))
    }
}
