// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Read and write strategies across the cache and persistent tiers.
//!
//! The coordinator never returns errors. Each tier's outcome is reconciled by fixed
//! priority and the remainder is reported through [`StorageOperationResult`].

use std::{sync::Arc, time::Duration};

use anyspawn::Spawner;
use futures::join;
use ohno::ErrorExt;
use serde::de::DeserializeOwned;
use tick::Clock;
use tierstore_tier::{Error, StorageBackend, StorageValue};

use crate::{
    ReadStrategy, StorageOperationResult, StorageType, WriteStrategy,
    telemetry::{StorageActivity, StorageEvent},
    utils::{OperationTimer, format_error},
};

pub(crate) const STORE_FAILED: &str = "Failed to store in both cache and persistent storage";
pub(crate) const DELETE_FAILED: &str = "Failed to delete from both cache and persistent storage";

/// The two tiers, shared with detached write-back tasks.
#[derive(Debug)]
pub(crate) struct Tiers<C, P> {
    pub cache: C,
    pub persistent: P,
}

impl<C: StorageBackend, P: StorageBackend> Tiers<C, P> {
    async fn write_back(&self, key: &str, value: StorageValue, ttl: Duration) {
        match self.cache.set(key, value, Some(ttl)).await {
            Ok(()) => StorageEvent::new(StorageActivity::WriteBack, "get")
                .storage_type(StorageType::Cache)
                .key(key)
                .emit(),
            Err(e) => StorageEvent::new(StorageActivity::WriteBackFailed, "get")
                .storage_type(StorageType::Cache)
                .key(key)
                .detail(&e.message())
                .emit(),
        }
    }
}

/// What one tier said about a key.
#[derive(Debug)]
enum TierRead<T> {
    /// An accepted value, along with the stored form used for write-back.
    Hit(T, StorageValue),
    /// Absent, undecodable, or rejected by the validator.
    Miss,
    Failed(String),
}

async fn read_tier<B, T, F>(tier: &B, storage_type: StorageType, key: &str, validator: &F) -> TierRead<T>
where
    B: StorageBackend,
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let found = match tier.get(key).await {
        Ok(found) => found,
        Err(e) => {
            let message = format_error(storage_type, "get", &e);
            StorageEvent::new(StorageActivity::TierFailed, "get")
                .storage_type(storage_type)
                .key(key)
                .detail(&message)
                .emit();
            return TierRead::Failed(message);
        }
    };

    let read = match found {
        Some(stored) => match stored.decode_validated(validator) {
            Some(value) => TierRead::Hit(value, stored),
            None => TierRead::Miss,
        },
        None => TierRead::Miss,
    };
    let activity = match read {
        TierRead::Hit(..) => StorageActivity::Hit,
        _ => StorageActivity::Miss,
    };
    StorageEvent::new(activity, "get").storage_type(storage_type).key(key).emit();
    read
}

/// Resolves a read where no tier produced an accepted value.
///
/// Only a read where every tier errored is a failure; it carries the last tier's message.
fn unresolved<T, U>(timer: &OperationTimer<'_>, first: TierRead<T>, last: TierRead<T>) -> StorageOperationResult<U> {
    match (first, last) {
        (TierRead::Failed(_), TierRead::Failed(message)) => timer.failure(message, StorageType::Hybrid),
        _ => timer.success(None, StorageType::Hybrid),
    }
}

/// How a cache write-back is run.
#[derive(Debug)]
pub(crate) enum WriteBack {
    /// Detached on the given spawner.
    Spawn(Spawner),
    /// Detached on the current Tokio runtime; skipped when there is none.
    Ambient,
    /// Awaited before the read returns.
    Inline,
}

#[cfg(feature = "tokio")]
fn ambient_spawner() -> Option<Spawner> {
    tokio::runtime::Handle::try_current().ok().map(|_| Spawner::new_tokio())
}

#[cfg(not(feature = "tokio"))]
fn ambient_spawner() -> Option<Spawner> {
    None
}

/// Applies read and write strategies to a pair of tiers.
#[derive(Debug)]
pub(crate) struct Coordinator<C, P> {
    tiers: Arc<Tiers<C, P>>,
    clock: Clock,
    write_back: WriteBack,
    write_back_ttl: Duration,
}

impl<C, P> Coordinator<C, P>
where
    C: StorageBackend + 'static,
    P: StorageBackend + 'static,
{
    pub fn new(cache: C, persistent: P, clock: Clock, write_back: WriteBack, write_back_ttl: Duration) -> Self {
        Self {
            tiers: Arc::new(Tiers { cache, persistent }),
            clock,
            write_back,
            write_back_ttl,
        }
    }

    pub fn cache(&self) -> &C {
        &self.tiers.cache
    }

    pub fn persistent(&self) -> &P {
        &self.tiers.persistent
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn write_back_ttl(&self) -> Duration {
        self.write_back_ttl
    }

    /// Reads `key` according to `strategy`.
    ///
    /// A value counts as found only when it decodes into `T` and `validator` accepts it.
    pub async fn get<T, F>(&self, key: &str, validator: F, strategy: ReadStrategy) -> StorageOperationResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let timer = OperationTimer::start(&self.clock);
        let cache = &self.tiers.cache;
        let persistent = &self.tiers.persistent;

        match strategy {
            ReadStrategy::CacheFirst => {
                let first = read_tier(cache, StorageType::Cache, key, &validator).await;
                if let TierRead::Hit(value, _) = first {
                    return timer.success(Some(value), StorageType::Cache);
                }

                let second = read_tier(persistent, StorageType::Persistent, key, &validator).await;
                if let TierRead::Hit(value, stored) = second {
                    self.write_back(key, stored).await;
                    return timer.success(Some(value), StorageType::Persistent);
                }

                unresolved(&timer, first, second)
            }
            ReadStrategy::PersistentFirst => {
                let first = read_tier(persistent, StorageType::Persistent, key, &validator).await;
                if let TierRead::Hit(value, _) = first {
                    return timer.success(Some(value), StorageType::Persistent);
                }

                let second = read_tier(cache, StorageType::Cache, key, &validator).await;
                if let TierRead::Hit(value, _) = second {
                    return timer.success(Some(value), StorageType::Cache);
                }

                unresolved(&timer, first, second)
            }
            ReadStrategy::Both => {
                let (from_cache, from_persistent) = join!(
                    Box::pin(read_tier(cache, StorageType::Cache, key, &validator)),
                    Box::pin(read_tier(persistent, StorageType::Persistent, key, &validator))
                );

                match (from_cache, from_persistent) {
                    (TierRead::Hit(value, _), _) => timer.success(Some(value), StorageType::Cache),
                    (_, TierRead::Hit(value, _)) => timer.success(Some(value), StorageType::Persistent),
                    (from_cache, from_persistent) => unresolved(&timer, from_cache, from_persistent),
                }
            }
        }
    }

    /// Copies a value found in the persistent tier into the cache.
    ///
    /// Only [`WriteBack::Inline`] makes the read wait for the copy. A failed or skipped copy
    /// is only logged.
    async fn write_back(&self, key: &str, value: StorageValue) {
        let tiers = Arc::clone(&self.tiers);
        let owned_key = key.to_string();
        let ttl = self.write_back_ttl;
        let task = async move { tiers.write_back(&owned_key, value, ttl).await };

        // Detached handles are never awaited.
        match &self.write_back {
            WriteBack::Spawn(spawner) => drop(spawner.spawn(task)),
            WriteBack::Ambient => match ambient_spawner() {
                Some(spawner) => drop(spawner.spawn(task)),
                None => StorageEvent::new(StorageActivity::WriteBackSkipped, "get")
                    .storage_type(StorageType::Cache)
                    .key(key)
                    .detail("no spawner configured and no Tokio runtime is running")
                    .emit(),
            },
            WriteBack::Inline => task.await,
        }
    }

    /// Writes an already encoded value according to `strategy`.
    pub async fn set(&self, key: &str, value: StorageValue, ttl: Option<Duration>, strategy: WriteStrategy) -> StorageOperationResult<()> {
        let timer = OperationTimer::start(&self.clock);

        match strategy {
            WriteStrategy::Cache => match self.tiers.cache.set(key, value, ttl).await {
                Ok(()) => timer.success(Some(()), StorageType::Cache),
                Err(e) => timer.failure(format_error(StorageType::Cache, "set", &e), StorageType::Cache),
            },
            WriteStrategy::Persistent => match self.tiers.persistent.set(key, value, ttl).await {
                Ok(()) => timer.success(Some(()), StorageType::Persistent),
                Err(e) => timer.failure(format_error(StorageType::Persistent, "set", &e), StorageType::Persistent),
            },
            WriteStrategy::Hybrid => {
                let (cached, persisted) = join!(
                    Box::pin(self.tiers.cache.set(key, value.clone(), ttl)),
                    Box::pin(self.tiers.persistent.set(key, value, ttl))
                );
                log_tier_failure("set", key, StorageType::Cache, cached.as_ref().err());
                log_tier_failure("set", key, StorageType::Persistent, persisted.as_ref().err());

                match StorageType::from_outcomes(cached.is_ok(), persisted.is_ok()) {
                    Some(storage_type) => timer.success(Some(()), storage_type),
                    None => timer.failure(STORE_FAILED, StorageType::Hybrid),
                }
            }
        }
    }

    /// Removes `key` from both tiers.
    ///
    /// The data reports whether either tier actually held the key.
    pub async fn delete(&self, key: &str) -> StorageOperationResult<bool> {
        let timer = OperationTimer::start(&self.clock);
        let (cached, persisted) = join!(
            Box::pin(self.tiers.cache.delete(key)),
            Box::pin(self.tiers.persistent.delete(key))
        );
        log_tier_failure("delete", key, StorageType::Cache, cached.as_ref().err());
        log_tier_failure("delete", key, StorageType::Persistent, persisted.as_ref().err());

        match StorageType::from_outcomes(cached.is_ok(), persisted.is_ok()) {
            Some(storage_type) => {
                let removed = cached.unwrap_or(false) || persisted.unwrap_or(false);
                timer.success(Some(removed), storage_type)
            }
            None => timer.failure(DELETE_FAILED, StorageType::Hybrid),
        }
    }
}

pub(crate) fn log_tier_failure(operation: &str, key: &str, tier: StorageType, error: Option<&Error>) {
    if let Some(e) = error {
        StorageEvent::new(StorageActivity::TierFailed, operation)
            .storage_type(tier)
            .key(key)
            .detail(&format_error(tier, operation, e))
            .emit();
    }
}
