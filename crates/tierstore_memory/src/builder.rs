// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring in-memory backends.
//!
//! This module provides a builder API for `MemoryBackend` that abstracts
//! the underlying moka configuration, providing a stable API surface
//! without exposing moka's types.

use std::time::Duration;

use tick::Clock;

use crate::tier::MemoryBackend;

/// Builder for configuring a `MemoryBackend`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tick::Clock;
/// use tierstore_memory::MemoryBackend;
///
/// # fn example(clock: Clock) {
/// let cache = MemoryBackend::builder(clock)
///     .max_capacity(1000)
///     .initial_capacity(100)
///     .default_ttl(Duration::from_secs(300))
///     .name("session-cache")
///     .build();
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBackendBuilder {
    pub(crate) clock: Clock,
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) default_ttl: Option<Duration>,
    pub(crate) name: &'static str,
}

impl MemoryBackendBuilder {
    /// Creates a new builder with default settings.
    ///
    /// The default configuration creates an unbounded backend named `"memory"` whose
    /// entries only expire when a TTL is passed to `set`.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            max_capacity: None,
            initial_capacity: None,
            default_ttl: None,
            name: "memory",
        }
    }

    /// Sets the maximum number of entries.
    ///
    /// Once the capacity is reached, entries are evicted using the `TinyLFU` policy
    /// (a combination of LRU eviction and LFU admission). Eviction happens asynchronously,
    /// so the entry count may briefly exceed the limit.
    ///
    /// If not set, the backend is unbounded.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Sets the initial capacity (pre-allocation hint).
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Sets the TTL applied when `set` is called without one.
    ///
    /// An explicit TTL passed to `set` always takes precedence.
    #[must_use]
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets the name reported in statistics and used by moka for debugging output.
    #[must_use]
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Builds the configured `MemoryBackend`.
    #[must_use]
    pub fn build(self) -> MemoryBackend {
        MemoryBackend::from_builder(self)
    }
}
