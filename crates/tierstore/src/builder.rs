// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`StorageManager`].
//!
//! The builder tracks in its type which tiers have been provided, so a manager can only be
//! built once both the cache and the persistent tier are in place.

use anyspawn::Spawner;
use tick::Clock;
use tierstore_tier::StorageBackend;

#[cfg(feature = "memory")]
use tierstore_memory::MemoryBackend;

use crate::{
    MetricsService, StorageConfig, StorageManager,
    strategy::{Coordinator, WriteBack},
};

/// Builder for a [`StorageManager`].
///
/// Created by [`StorageManager::builder`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tick::Clock;
/// use tierstore::{StorageConfig, StorageManager};
/// use tierstore_memory::MemoryBackend;
///
/// let clock = Clock::new_frozen();
/// let manager = StorageManager::builder(clock.clone())
///     .cache(MemoryBackend::new(clock.clone()))
///     .persistent(MemoryBackend::new(clock))
///     .config(StorageConfig::default().with_write_back_ttl(Duration::from_secs(60)))
///     .build();
///
/// assert_eq!(manager.config().write_back_ttl(), Duration::from_secs(60));
/// ```
#[derive(Debug)]
pub struct StorageManagerBuilder<C = (), P = ()> {
    clock: Clock,
    cache: C,
    persistent: P,
    config: StorageConfig,
    metrics: Option<MetricsService>,
    write_back: WriteBack,
}

impl StorageManagerBuilder<(), ()> {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            clock,
            cache: (),
            persistent: (),
            config: StorageConfig::default(),
            metrics: None,
            write_back: WriteBack::Ambient,
        }
    }
}

impl<C, P> StorageManagerBuilder<C, P> {
    /// Sets the cache tier.
    pub fn cache<C2: StorageBackend>(self, cache: C2) -> StorageManagerBuilder<C2, P> {
        StorageManagerBuilder {
            clock: self.clock,
            cache,
            persistent: self.persistent,
            config: self.config,
            metrics: self.metrics,
            write_back: self.write_back,
        }
    }

    /// Sets the persistent tier.
    pub fn persistent<P2: StorageBackend>(self, persistent: P2) -> StorageManagerBuilder<C, P2> {
        StorageManagerBuilder {
            clock: self.clock,
            cache: self.cache,
            persistent,
            config: self.config,
            metrics: self.metrics,
            write_back: self.write_back,
        }
    }

    /// Uses an in-memory tier, sharing the builder's clock, as the cache.
    #[cfg(feature = "memory")]
    #[must_use]
    pub fn memory(self) -> StorageManagerBuilder<MemoryBackend, P> {
        let cache = MemoryBackend::new(self.clock.clone());
        self.cache(cache)
    }

    /// Replaces the default configuration.
    #[must_use]
    pub fn config(mut self, config: StorageConfig) -> Self {
        self.config = config;
        self
    }

    /// Reports operations to `metrics` instead of a private metrics service.
    ///
    /// Sharing one service between managers aggregates their metrics.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsService) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs cache write-backs on `spawner`, detached from the read that triggered them.
    ///
    /// By default a write-back is detached on the Tokio runtime the read runs on. Outside a
    /// runtime, or without the `tokio` feature, it is skipped and a warning is logged; the read
    /// itself never waits on the cache.
    #[must_use]
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.write_back = WriteBack::Spawn(spawner);
        self
    }

    /// Runs cache write-backs on the ambient Tokio runtime.
    ///
    /// Spawning panics if the read is not running inside a runtime.
    #[cfg(feature = "tokio")]
    #[must_use]
    pub fn tokio(self) -> Self {
        self.spawner(Spawner::new_tokio())
    }

    /// Completes cache write-backs before the read that triggered them returns.
    ///
    /// A cache `set` that never finishes then stalls the read as well. Meant for
    /// deterministic tests and single-threaded executors without a spawner.
    #[must_use]
    pub fn inline_write_back(mut self) -> Self {
        self.write_back = WriteBack::Inline;
        self
    }
}

impl<C, P> StorageManagerBuilder<C, P>
where
    C: StorageBackend + 'static,
    P: StorageBackend + 'static,
{
    /// Builds the manager.
    ///
    /// Unless one was provided, a metrics service is created with the configured
    /// slow-operation threshold.
    #[must_use]
    pub fn build(self) -> StorageManager<C, P> {
        let metrics = self.metrics.unwrap_or_else(|| {
            MetricsService::builder(self.clock.clone())
                .slow_threshold(self.config.slow_operation_threshold())
                .build()
        });
        let coordinator = Coordinator::new(
            self.cache,
            self.persistent,
            self.clock,
            self.write_back,
            self.config.write_back_ttl(),
        );

        StorageManager::new(coordinator, self.config, metrics)
    }
}
