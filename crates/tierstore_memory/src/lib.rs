// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Volatile cache tier backed by moka.
//!
//! This crate provides [`MemoryBackend`], a concurrent in-memory [`StorageBackend`] using
//! moka's `TinyLFU` eviction for capacity limits. Per-entry TTLs are evaluated against an
//! injected [`Clock`], so expiry can be driven deterministically in tests. Use
//! [`MemoryBackendBuilder`] to configure capacity and a default TTL without exposing moka
//! types directly.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use tick::Clock;
//! use tierstore_memory::MemoryBackend;
//! use tierstore_tier::{StorageBackend, StorageValue};
//!
//! # fn example(clock: Clock) {
//! # futures::executor::block_on(async {
//! let cache = MemoryBackend::builder(clock)
//!     .max_capacity(1000)
//!     .default_ttl(Duration::from_secs(300))
//!     .build();
//!
//! cache.set("key", StorageValue::from(42), None).await?;
//! assert_eq!(cache.get("key").await?, Some(StorageValue::from(42)));
//! # Ok::<(), tierstore_tier::Error>(())
//! # }).unwrap();
//! # }
//! ```
//!
//! [`StorageBackend`]: tierstore_tier::StorageBackend
//! [`Clock`]: tick::Clock

pub mod builder;
pub mod tier;

#[doc(inline)]
pub use builder::MemoryBackendBuilder;
#[doc(inline)]
pub use tier::MemoryBackend;
