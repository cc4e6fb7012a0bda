// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The storage manager façade.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use futures::join;
use ohno::ErrorExt;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tick::Clock;
use tierstore_tier::{CleanupOptions, CleanupReport, Error, KeyPattern, StorageBackend, StorageValue, TierStats};

use crate::{
    MetricsService, OperationKind, ReadStrategy, StorageConfig, StorageManagerBuilder, StorageMetrics, StorageOperationResult,
    StorageType, WriteStrategy,
    strategy::Coordinator,
    telemetry::{StorageActivity, StorageEvent, log_operation},
    utils::{OperationTimer, format_error},
};

pub(crate) const SYNC_DISABLED: &str = "Sync is disabled";

/// What [`StorageManager::sync`] should copy.
///
/// # Examples
///
/// ```
/// use tierstore::SyncOptions;
///
/// // Push every `important_` cache entry to the persistent tier.
/// let push = SyncOptions::to_server();
///
/// // Refresh two keys in the cache from the persistent tier.
/// let pull = SyncOptions::to_client().with_keys(["level", "score"]);
/// assert_eq!(pull.keys.as_deref(), Some(&["level".to_string(), "score".to_string()][..]));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Copy entries from the persistent tier into the cache.
    pub sync_to_client: bool,
    /// Copy entries from the cache into the persistent tier.
    pub sync_to_server: bool,
    /// The keys to copy. When `None`, pulls copy every persistent key and pushes copy every
    /// cache key starting with the configured sync prefix.
    pub keys: Option<Vec<String>>,
}

impl SyncOptions {
    /// Copies from the persistent tier into the cache.
    #[must_use]
    pub fn to_client() -> Self {
        Self {
            sync_to_client: true,
            ..Self::default()
        }
    }

    /// Copies from the cache into the persistent tier.
    #[must_use]
    pub fn to_server() -> Self {
        Self {
            sync_to_server: true,
            ..Self::default()
        }
    }

    /// Copies in both directions.
    #[must_use]
    pub fn both() -> Self {
        Self {
            sync_to_client: true,
            sync_to_server: true,
            keys: None,
        }
    }

    /// Restricts the sync to `keys`.
    #[must_use]
    pub fn with_keys<I, K>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: Some(keys.into_iter().map(Into::into).collect()),
            ..self
        }
    }
}

/// Direction of a sync copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// From the persistent tier into the cache.
    ToClient,
    /// From the cache into the persistent tier.
    ToServer,
}

/// A key that could not be synced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFailure {
    /// The direction that failed.
    pub direction: SyncDirection,
    /// The key, or `None` when listing the keys to sync failed.
    pub key: Option<String>,
    /// What went wrong.
    pub error: String,
}

/// Outcome of a sync. Every key is attempted independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Keys copied into the cache.
    pub to_client: Vec<String>,
    /// Keys copied into the persistent tier.
    pub to_server: Vec<String>,
    /// Keys absent from the tier they were to be copied from.
    pub skipped: Vec<String>,
    /// Keys that could not be copied.
    pub failures: Vec<SyncFailure>,
}

/// Statistics of both tiers plus the process-wide metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CombinedStats {
    /// The cache tier's statistics, or `None` when it could not report them.
    pub cache: Option<TierStats>,
    /// The persistent tier's statistics, or `None` when it could not report them.
    pub persistent: Option<TierStats>,
    /// The metrics snapshot, when metrics are enabled.
    pub metrics: Option<StorageMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reconcile {
    /// Succeeds when either tier succeeds.
    Any,
    /// Succeeds only when both tiers succeed.
    All,
}

struct ManagerInner<C, P> {
    coordinator: Coordinator<C, P>,
    config: StorageConfig,
    metrics: MetricsService,
}

/// A single entry point to a cache tier and a persistent tier.
///
/// Every operation is timed, logged, and, when metrics are enabled, reported to the
/// [`MetricsService`]. Operations never return errors: each resolves to a
/// [`StorageOperationResult`] describing which tiers took part and what failed. The only
/// exception is [`get_or_set`](Self::get_or_set), which hands a failing factory's error
/// back to the caller.
///
/// Clones share the same tiers, configuration, and metrics.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # fn main() {
/// use tick::Clock;
/// use tierstore::testing::MockBackend;
/// use tierstore::{ReadStrategy, StorageManager, StorageType, WriteStrategy};
/// # futures::executor::block_on(async {
///
/// let manager = StorageManager::builder(Clock::new_frozen())
///     .cache(MockBackend::named("cache"))
///     .persistent(MockBackend::named("persistent"))
///     .build();
///
/// let stored = manager.set("important_progress", &42, None, WriteStrategy::Hybrid).await;
/// assert_eq!(stored.storage_type(), StorageType::Hybrid);
///
/// let read = manager.get("important_progress", |v: &i64| *v > 0, ReadStrategy::CacheFirst).await;
/// assert_eq!(read.data(), Some(&42));
/// assert_eq!(read.storage_type(), StorageType::Cache);
/// # });
/// # }
/// # #[cfg(not(feature = "test-util"))]
/// # fn main() {}
/// ```
pub struct StorageManager<C, P> {
    inner: Arc<ManagerInner<C, P>>,
}

impl<C, P> Clone for StorageManager<C, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: std::fmt::Debug, P: std::fmt::Debug> std::fmt::Debug for StorageManager<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("coordinator", &self.inner.coordinator)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl StorageManager<(), ()> {
    /// Creates a builder for a storage manager.
    ///
    /// Both tiers must be provided before the manager can be built.
    #[must_use]
    pub fn builder(clock: Clock) -> StorageManagerBuilder<(), ()> {
        StorageManagerBuilder::new(clock)
    }
}

impl<C, P> StorageManager<C, P>
where
    C: StorageBackend + 'static,
    P: StorageBackend + 'static,
{
    pub(crate) fn new(coordinator: Coordinator<C, P>, config: StorageConfig, metrics: MetricsService) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                coordinator,
                config,
                metrics,
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    /// Returns the metrics service operations are reported to.
    #[must_use]
    pub fn metrics(&self) -> &MetricsService {
        &self.inner.metrics
    }

    /// Returns the cache tier.
    #[must_use]
    pub fn cache(&self) -> &C {
        self.inner.coordinator.cache()
    }

    /// Returns the persistent tier.
    #[must_use]
    pub fn persistent(&self) -> &P {
        self.inner.coordinator.persistent()
    }

    fn clock(&self) -> &Clock {
        self.inner.coordinator.clock()
    }

    fn report<T>(&self, kind: OperationKind, key: Option<&str>, result: &StorageOperationResult<T>, size_bytes: Option<u64>) {
        log_operation(
            kind.as_str(),
            result.storage_type(),
            key,
            result.duration(),
            result.error(),
            self.inner.config.slow_operation_threshold(),
        );

        if self.inner.config.metrics_enabled() {
            self.inner
                .metrics
                .track_operation(kind, result.storage_type(), result.is_success(), result.duration(), size_bytes);
        }
    }

    /// Reads `key` according to `strategy`.
    ///
    /// A stored value counts as found only when it decodes into `T` and `validator` accepts
    /// it. A miss is a successful result without data. With
    /// [`ReadStrategy::CacheFirst`], a value found only in the persistent tier is copied into
    /// the cache with the configured write-back TTL.
    pub async fn get<T, F>(&self, key: &str, validator: F, strategy: ReadStrategy) -> StorageOperationResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let result = self.inner.coordinator.get(key, validator, strategy).await;
        self.report(OperationKind::Get, Some(key), &result, None);

        if self.inner.config.metrics_enabled() {
            let hit = result.data().is_some() && result.storage_type() == StorageType::Cache;
            self.inner.metrics.track_cache_hit(hit);
        }
        result
    }

    /// Stores `value` under `key` according to `strategy`.
    ///
    /// `ttl` bounds how long the entry lives; `None` uses each tier's default.
    pub async fn set<T>(&self, key: &str, value: &T, ttl: Option<Duration>, strategy: WriteStrategy) -> StorageOperationResult<()>
    where
        T: Serialize + ?Sized,
    {
        let (result, size_bytes) = match StorageValue::encode(value) {
            Ok(stored) => {
                let size_bytes = stored.size_bytes();
                (self.inner.coordinator.set(key, stored, ttl, strategy).await, Some(size_bytes))
            }
            Err(e) => {
                let timer = OperationTimer::start(self.clock());
                (
                    timer.failure(format!("failed to encode value: {}", e.message()), strategy.storage_type()),
                    None,
                )
            }
        };

        self.report(OperationKind::Set, Some(key), &result, size_bytes.filter(|_| result.is_success()));
        result
    }

    /// Removes `key` from both tiers.
    ///
    /// Succeeds when either tier succeeds. The data tells whether anything was removed, so
    /// deleting an absent key succeeds with `false`.
    pub async fn delete(&self, key: &str) -> StorageOperationResult<bool> {
        let result = self.inner.coordinator.delete(key).await;
        self.report(OperationKind::Delete, Some(key), &result, None);
        result
    }

    /// Checks both tiers for `key` concurrently.
    ///
    /// Reports [`StorageType::Cache`] when the cache holds the key, whatever the persistent
    /// tier says.
    pub async fn exists(&self, key: &str) -> StorageOperationResult<bool> {
        let timer = OperationTimer::start(self.clock());
        let (cached, persisted) = join!(
            Box::pin(self.cache().exists(key)),
            Box::pin(self.persistent().exists(key))
        );

        let result = match (cached, persisted) {
            (Ok(true), _) => timer.success(Some(true), StorageType::Cache),
            (_, Ok(true)) => timer.success(Some(true), StorageType::Persistent),
            (Err(cache_error), Err(persistent_error)) => timer.failure(
                join_errors([
                    tier_error(OperationKind::Exists, StorageType::Cache, &cache_error),
                    tier_error(OperationKind::Exists, StorageType::Persistent, &persistent_error),
                ]),
                StorageType::Hybrid,
            ),
            (cached, persisted) => {
                if let Err(e) = &cached {
                    tier_error(OperationKind::Exists, StorageType::Cache, e);
                }
                if let Err(e) = &persisted {
                    tier_error(OperationKind::Exists, StorageType::Persistent, e);
                }
                let storage_type = StorageType::from_outcomes(cached.is_ok(), persisted.is_ok()).unwrap_or(StorageType::Hybrid);
                timer.success(Some(false), storage_type)
            }
        };

        self.report(OperationKind::Exists, Some(key), &result, None);
        result
    }

    /// Removes every entry from both tiers. Succeeds only when both tiers succeed.
    pub async fn clear(&self) -> StorageOperationResult<()> {
        let timer = OperationTimer::start(self.clock());
        let (cached, persisted) = join!(Box::pin(self.cache().clear()), Box::pin(self.persistent().clear()));

        let result = reconcile(&timer, OperationKind::Clear, cached, persisted, Reconcile::All, |_, _| ());
        self.report(OperationKind::Clear, None, &result, None);
        result
    }

    /// Lists the keys held by either tier, sorted and without duplicates.
    pub async fn get_keys(&self) -> StorageOperationResult<Vec<String>> {
        let timer = OperationTimer::start(self.clock());
        let (cached, persisted) = join!(Box::pin(self.cache().keys()), Box::pin(self.persistent().keys()));

        let result = reconcile(&timer, OperationKind::GetKeys, cached, persisted, Reconcile::Any, |cached, persisted| {
            cached
                .into_iter()
                .chain(persisted)
                .flatten()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        });
        self.report(OperationKind::GetKeys, None, &result, None);
        result
    }

    /// Removes the keys matching `pattern` from both tiers.
    ///
    /// Succeeds when either tier succeeds. The data is the number of entries removed across
    /// both tiers.
    pub async fn invalidate(&self, pattern: &KeyPattern) -> StorageOperationResult<u64> {
        let timer = OperationTimer::start(self.clock());
        let (cached, persisted) = join!(
            Box::pin(self.cache().invalidate(pattern)),
            Box::pin(self.persistent().invalidate(pattern))
        );

        let result = reconcile(&timer, OperationKind::Invalidate, cached, persisted, Reconcile::Any, |cached, persisted| {
            cached.unwrap_or(0) + persisted.unwrap_or(0)
        });
        self.report(OperationKind::Invalidate, Some(pattern.as_str()), &result, None);
        result
    }

    /// Collects the statistics of both tiers.
    ///
    /// A tier that cannot report is left out. Fails only when neither tier can report.
    pub async fn get_stats(&self) -> StorageOperationResult<CombinedStats> {
        let timer = OperationTimer::start(self.clock());
        let (cached, persisted) = join!(Box::pin(self.cache().stats()), Box::pin(self.persistent().stats()));
        let metrics = self.inner.config.metrics_enabled().then(|| self.inner.metrics.get_metrics());

        let result = reconcile(&timer, OperationKind::GetStats, cached, persisted, Reconcile::Any, |cache, persistent| {
            CombinedStats {
                cache,
                persistent,
                metrics,
            }
        });
        self.report(OperationKind::GetStats, None, &result, None);
        result
    }

    /// Removes expired entries, and with [`CleanupOptions::older_than`] aged entries, from
    /// both tiers.
    ///
    /// Succeeds only when both tiers succeed; the reports of both tiers are merged.
    pub async fn cleanup(&self, options: &CleanupOptions) -> StorageOperationResult<CleanupReport> {
        let timer = OperationTimer::start(self.clock());
        let (cached, persisted) = join!(
            Box::pin(self.cache().cleanup(options)),
            Box::pin(self.persistent().cleanup(options))
        );

        let result = reconcile(&timer, OperationKind::Cleanup, cached, persisted, Reconcile::All, |cached, persisted| {
            cached.unwrap_or_default().merge(persisted.unwrap_or_default())
        });
        self.report(OperationKind::Cleanup, None, &result, None);
        result
    }

    /// Copies entries between the tiers.
    ///
    /// Pulls ([`SyncOptions::sync_to_client`]) copy from the persistent tier into the cache
    /// with the write-back TTL. Pushes ([`SyncOptions::sync_to_server`]) copy from the cache
    /// into the persistent tier. Each key is handled on its own; failures are collected in
    /// the report and do not stop the remaining keys. The result fails when any key failed.
    ///
    /// When sync is disabled in the configuration the call fails without touching either tier.
    pub async fn sync(&self, options: &SyncOptions) -> StorageOperationResult<SyncReport> {
        let timer = OperationTimer::start(self.clock());
        let storage_type = match (options.sync_to_client, options.sync_to_server) {
            (true, false) => StorageType::Cache,
            (false, true) => StorageType::Persistent,
            _ => StorageType::Hybrid,
        };

        if !self.inner.config.sync_enabled() {
            let result = timer.failure(SYNC_DISABLED, storage_type);
            self.report(OperationKind::Sync, None, &result, None);
            return result;
        }

        let mut report = SyncReport::default();
        if options.sync_to_client {
            let keys = match &options.keys {
                Some(keys) => Ok(keys.clone()),
                None => self.persistent().keys().await,
            };
            let ttl = Some(self.inner.coordinator.write_back_ttl());
            copy_keys(self.persistent(), self.cache(), keys, ttl, SyncDirection::ToClient, &mut report).await;
        }
        if options.sync_to_server {
            let keys = match &options.keys {
                Some(keys) => Ok(keys.clone()),
                None => self.cache().keys().await.map(|keys| {
                    keys.into_iter()
                        .filter(|key| key.starts_with(self.inner.config.sync_prefix()))
                        .collect()
                }),
            };
            copy_keys(self.cache(), self.persistent(), keys, None, SyncDirection::ToServer, &mut report).await;
        }

        let result = if report.failures.is_empty() {
            timer.success(Some(report), storage_type)
        } else {
            let message = format!("{} sync operation(s) failed", report.failures.len());
            timer.partial(Some(report), message, storage_type)
        };
        self.report(OperationKind::Sync, None, &result, None);
        result
    }

    /// Returns the value under `key`, producing and storing it on a miss.
    ///
    /// The read is cache-first. When nothing acceptable is found, `factory` is called once,
    /// its value is stored according to `strategy`, and the value is returned. The storage type
    /// names the tiers that accepted the write.
    ///
    /// When no tier accepted it, the produced value is still returned as data, but the result
    /// is a failure carrying the store error, with [`StorageType::Hybrid`] as its storage type.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged. The factory is never called on a hit.
    pub async fn get_or_set<T, V, F, Fut, E>(
        &self,
        key: &str,
        validator: V,
        factory: F,
        ttl: Option<Duration>,
        strategy: WriteStrategy,
    ) -> Result<StorageOperationResult<T>, E>
    where
        T: Serialize + DeserializeOwned,
        V: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let timer = OperationTimer::start(self.clock());
        let cached = self.inner.coordinator.get(key, validator, ReadStrategy::CacheFirst).await;
        if cached.data().is_some() {
            let storage_type = cached.storage_type();
            let result = timer.success(cached.into_data(), storage_type);
            self.report(OperationKind::GetOrSet, Some(key), &result, None);
            return Ok(result);
        }

        let value = match factory().await {
            Ok(value) => value,
            Err(e) => {
                let failed: StorageOperationResult<T> = timer.failure("value factory failed", StorageType::Hybrid);
                self.report(OperationKind::GetOrSet, Some(key), &failed, None);
                return Err(e);
            }
        };

        let stored = match StorageValue::encode(&value) {
            Ok(encoded) => {
                let size_bytes = encoded.size_bytes();
                let stored = self.inner.coordinator.set(key, encoded, ttl, strategy).await;
                match stored.error() {
                    None => Ok((stored.storage_type(), size_bytes)),
                    Some(error) => Err(error.to_string()),
                }
            }
            Err(e) => Err(format!("failed to encode value: {}", e.message())),
        };

        let (result, size_bytes) = match stored {
            Ok((storage_type, size_bytes)) => (timer.success(Some(value), storage_type), Some(size_bytes)),
            Err(error) => {
                store_failed(key, &error);
                (timer.partial(Some(value), error, StorageType::Hybrid), None)
            }
        };
        self.report(OperationKind::GetOrSet, Some(key), &result, size_bytes);
        Ok(result)
    }
}

fn store_failed(key: &str, error: &str) {
    StorageEvent::new(StorageActivity::StoreFailed, OperationKind::GetOrSet.as_str())
        .key(key)
        .detail(error)
        .emit();
}

/// Formats and logs the failure of one tier.
fn tier_error(kind: OperationKind, tier: StorageType, error: &Error) -> String {
    let message = format_error(tier, kind.as_str(), error);
    StorageEvent::new(StorageActivity::TierFailed, kind.as_str())
        .storage_type(tier)
        .detail(&message)
        .emit();
    message
}

fn join_errors(errors: impl IntoIterator<Item = String>) -> String {
    errors.into_iter().collect::<Vec<_>>().join("; ")
}

/// Combines the outcomes of an operation issued to both tiers.
fn reconcile<A, B, R>(
    timer: &OperationTimer<'_>,
    kind: OperationKind,
    cached: Result<A, Error>,
    persisted: Result<B, Error>,
    policy: Reconcile,
    combine: impl FnOnce(Option<A>, Option<B>) -> R,
) -> StorageOperationResult<R> {
    let satisfied = StorageType::from_outcomes(cached.is_ok(), persisted.is_ok());

    let mut errors = Vec::new();
    let cached = match cached {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(tier_error(kind, StorageType::Cache, &e));
            None
        }
    };
    let persisted = match persisted {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(tier_error(kind, StorageType::Persistent, &e));
            None
        }
    };

    match (policy, satisfied) {
        (Reconcile::Any, Some(storage_type)) | (Reconcile::All, Some(storage_type @ StorageType::Hybrid)) => {
            timer.success(Some(combine(cached, persisted)), storage_type)
        }
        (_, satisfied) => timer.failure(join_errors(errors), satisfied.unwrap_or(StorageType::Hybrid)),
    }
}

/// Copies each key from `source` to `target`, recording the outcome in `report`.
async fn copy_keys<S, T>(
    source: &S,
    target: &T,
    keys: Result<Vec<String>, Error>,
    ttl: Option<Duration>,
    direction: SyncDirection,
    report: &mut SyncReport,
) where
    S: StorageBackend,
    T: StorageBackend,
{
    let (source_type, target_type) = match direction {
        SyncDirection::ToClient => (StorageType::Persistent, StorageType::Cache),
        SyncDirection::ToServer => (StorageType::Cache, StorageType::Persistent),
    };

    let keys = match keys {
        Ok(keys) => keys,
        Err(e) => {
            record_sync_failure(report, direction, None, format_error(source_type, "get_keys", &e));
            return;
        }
    };

    for key in keys {
        let value = match source.get(&key).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                report.skipped.push(key);
                continue;
            }
            Err(e) => {
                let error = format_error(source_type, "get", &e);
                record_sync_failure(report, direction, Some(key), error);
                continue;
            }
        };

        match target.set(&key, value, ttl).await {
            Ok(()) => match direction {
                SyncDirection::ToClient => report.to_client.push(key),
                SyncDirection::ToServer => report.to_server.push(key),
            },
            Err(e) => {
                let error = format_error(target_type, "set", &e);
                record_sync_failure(report, direction, Some(key), error);
            }
        }
    }
}

fn record_sync_failure(report: &mut SyncReport, direction: SyncDirection, key: Option<String>, error: String) {
    let mut event = StorageEvent::new(StorageActivity::SyncFailed, OperationKind::Sync.as_str()).detail(&error);
    if let Some(key) = &key {
        event = event.key(key);
    }
    event.emit();

    report.failures.push(SyncFailure { direction, key, error });
}

#[cfg(test)]
mod tests {
    use tierstore_tier::testing::MockBackend;

    use super::*;
    use crate::{
        strategy::{DELETE_FAILED, STORE_FAILED},
        telemetry::{attributes, testing::LogCapture},
    };

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        futures::executor::block_on(f)
    }

    fn manager(config: StorageConfig) -> (StorageManager<MockBackend, MockBackend>, MockBackend, MockBackend) {
        let cache = MockBackend::named("cache");
        let persistent = MockBackend::named("persistent");
        let manager = StorageManager::builder(Clock::new_frozen())
            .cache(cache.clone())
            .persistent(persistent.clone())
            .config(config)
            .build();
        (manager, cache, persistent)
    }

    #[test]
    fn reconcile_any_tolerates_one_failure() {
        let clock = Clock::new_frozen();
        let timer = OperationTimer::start(&clock);

        let result = reconcile(
            &timer,
            OperationKind::GetKeys,
            Err::<u64, _>(Error::from_message("down")),
            Ok::<u64, Error>(2),
            Reconcile::Any,
            |c, p| c.unwrap_or(0) + p.unwrap_or(0),
        );

        assert!(result.is_success());
        assert_eq!(result.data(), Some(&2));
        assert_eq!(result.storage_type(), StorageType::Persistent);
    }

    #[test]
    fn reconcile_all_requires_both() {
        let clock = Clock::new_frozen();
        let timer = OperationTimer::start(&clock);

        let result = reconcile(
            &timer,
            OperationKind::Clear,
            Ok::<(), Error>(()),
            Err::<(), _>(Error::from_message("read-only")),
            Reconcile::All,
            |_, _| (),
        );

        assert!(!result.is_success());
        assert_eq!(result.storage_type(), StorageType::Cache);
        assert!(result.error().is_some_and(|e| e.starts_with("persistent clear failed") && e.contains("read-only")));
    }

    #[test]
    fn encode_failure_is_a_failed_set() {
        block_on(async {
            let (manager, cache, persistent) = manager(StorageConfig::default());
            let unencodable = std::collections::HashMap::from([((1, 2), "tuple keys are not JSON")]);

            let result = manager.set("k", &unencodable, None, WriteStrategy::Hybrid).await;

            assert!(!result.is_success());
            assert!(result.error().is_some_and(|e| e.starts_with("failed to encode value")));
            assert!(cache.operations().is_empty());
            assert!(persistent.operations().is_empty());
        });
    }

    #[test]
    fn disabled_metrics_track_nothing() {
        block_on(async {
            let (manager, _cache, _persistent) = manager(StorageConfig::default().with_metrics(false));

            let _ = manager.set("k", "v", None, WriteStrategy::Cache).await;
            let _ = manager.get("k", |_: &String| true, ReadStrategy::CacheFirst).await;

            let snapshot = manager.metrics().get_metrics();
            assert_eq!(snapshot.total_operations(), 0);
            assert_eq!(snapshot.performance.cache_hits, 0);
        });
    }

    #[test]
    fn failed_operations_are_logged_as_errors() {
        block_on(async {
            let capture = LogCapture::new();
            let _guard = tracing::subscriber::set_default(capture.subscriber());
            let (manager, cache, persistent) = manager(StorageConfig::default());
            cache.fail_all();
            persistent.fail_all();

            let _ = manager.delete("quiz_3").await;

            capture.assert_event(StorageActivity::Failed);
            capture.assert_field(attributes::STORAGE_KEY_NAME, "quiz_3");
            capture.assert_field(attributes::STORAGE_DETAIL_NAME, DELETE_FAILED);
        });
    }

    #[test]
    fn unstored_factory_value_fails_with_the_value_attached() {
        block_on(async {
            let capture = LogCapture::new();
            let _guard = tracing::subscriber::set_default(capture.subscriber());
            let (manager, cache, persistent) = manager(StorageConfig::default());
            cache.fail_when(|op| op.is_write());
            persistent.fail_when(|op| op.is_write());

            let result = manager
                .get_or_set("k", |_: &u32| true, || async { Ok::<_, std::io::Error>(5) }, None, WriteStrategy::Hybrid)
                .await
                .expect("factory succeeded");

            assert!(!result.is_success());
            assert_eq!(result.data(), Some(&5));
            assert_eq!(result.error(), Some(STORE_FAILED));
            assert_eq!(result.storage_type(), StorageType::Hybrid);
            capture.assert_event(StorageActivity::StoreFailed);
            capture.assert_field(attributes::STORAGE_DETAIL_NAME, STORE_FAILED);

            let snapshot = manager.metrics().get_metrics();
            assert_eq!(snapshot.operations[&OperationKind::GetOrSet].errors, 1);
        });
    }

    #[test]
    fn debug_hides_internals() {
        let (manager, _cache, _persistent) = manager(StorageConfig::default());
        let debug = format!("{manager:?}");

        assert!(debug.starts_with("StorageManager"));
        assert!(debug.contains(".."));
    }
}
