// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Tiered storage coordination over a fast cache tier and a durable persistent tier.
//!
//! A [`StorageManager`] fronts two [`StorageBackend`]s and gives callers one place to read,
//! write, and maintain application data:
//! - Read strategies decide which tier is consulted first ([`ReadStrategy`])
//! - Write strategies decide which tiers receive a write ([`WriteStrategy`])
//! - Values found only in the persistent tier are written back to the cache with a TTL
//! - Entries can be synced between the tiers in either direction
//! - Every operation is timed, logged through `tracing`, and counted by a [`MetricsService`]
//!
//! Operations never return errors. Each one resolves to a [`StorageOperationResult`] that
//! says whether it succeeded, which tier or tiers satisfied it, and how long it took.
//!
//! # Examples
//!
//! ```
//! use tick::Clock;
//! use tierstore::{ReadStrategy, StorageManager, StorageType, WriteStrategy};
//! use tierstore_memory::MemoryBackend;
//! # futures::executor::block_on(async {
//!
//! let clock = Clock::new_frozen();
//! let manager = StorageManager::builder(clock.clone())
//!     .cache(MemoryBackend::new(clock.clone()))
//!     .persistent(MemoryBackend::new(clock))
//!     .build();
//!
//! let written = manager.set("quiz_1", &vec![3, 1, 2], None, WriteStrategy::Hybrid).await;
//! assert!(written.is_success());
//!
//! let read = manager.get("quiz_1", |answers: &Vec<u8>| !answers.is_empty(), ReadStrategy::CacheFirst).await;
//! assert_eq!(read.data(), Some(&vec![3, 1, 2]));
//! assert_eq!(read.storage_type(), StorageType::Cache);
//! # });
//! ```
//!
//! # Write-back
//!
//! With [`ReadStrategy::CacheFirst`], a value found only in the persistent tier is copied into
//! the cache with [`StorageConfig::write_back_ttl`]. The read never waits for the copy:
//!
//! - with a spawner ([`StorageManagerBuilder::spawner`]), the copy is detached on it;
//! - otherwise it is detached on the Tokio runtime the read runs on, or skipped with a
//!   `storage.write_back_skipped` warning when there is none.
//!
//! [`StorageManagerBuilder::inline_write_back`] opts into awaiting the copy instead. A failed
//! copy never fails the read.
//!
//! # Features
//!
//! - `memory` (default): [`StorageManagerBuilder::memory`] and the in-memory tier.
//! - `tokio` (default): detached write-backs on the current Tokio runtime.
//! - `file`: re-exports the JSON file tier as [`FileBackend`].
//! - `metrics`: exports operation counters and durations through OpenTelemetry.
//! - `dynamic-backend`: [`DynamicBackend`] for tiers chosen at runtime.
//! - `test-util`: the [`testing`] module.

mod builder;
mod config;
mod manager;
mod metrics;
mod result;
mod strategy;
mod telemetry;
#[cfg(any(feature = "test-util", test))]
pub mod testing;
mod utils;

#[doc(inline)]
pub use builder::StorageManagerBuilder;
#[doc(inline)]
pub use config::{
    DEFAULT_SLOW_OPERATION_THRESHOLD, DEFAULT_SYNC_PREFIX, DEFAULT_WRITE_BACK_TTL, ReadStrategy, StorageConfig, WriteStrategy,
};
#[doc(inline)]
pub use manager::{CombinedStats, StorageManager, SyncDirection, SyncFailure, SyncOptions, SyncReport};
#[doc(inline)]
pub use metrics::{
    ErrorDetail, MetricsService, MetricsServiceBuilder, MiddlewareFailure, MiddlewareMetrics, OperationKind, OperationStats,
    PerformanceStats, SAMPLE_WINDOW, StorageMetrics, StorageTypeStats,
};
#[doc(inline)]
pub use result::{StorageOperationResult, StorageType};
#[cfg(feature = "file")]
#[doc(inline)]
pub use tierstore_file::FileBackend;
#[cfg(feature = "memory")]
#[doc(inline)]
pub use tierstore_memory::MemoryBackend;
#[doc(inline)]
pub use tierstore_tier::{
    CleanupOptions, CleanupReport, Error, KeyPattern, Result, StorageBackend, StorageBackendExt, StorageValue, TierStats,
};
#[cfg(feature = "dynamic-backend")]
#[doc(inline)]
pub use tierstore_tier::{DynamicBackend, DynamicBackendExt};
#[doc(inline)]
pub use utils::format_error;
