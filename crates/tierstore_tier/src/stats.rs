// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Tier statistics and maintenance types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Native statistics reported by a single tier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    /// Name of the backend that produced these statistics.
    pub backend: String,
    /// Number of live entries.
    pub entries: u64,
    /// Approximate stored size in bytes, `0` when the tier does not track it.
    pub size_bytes: u64,
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found nothing, or only an expired entry.
    pub misses: u64,
}

impl TierStats {
    /// Creates statistics with zeroed hit and miss counters.
    #[must_use]
    pub fn new(backend: impl Into<String>, entries: u64, size_bytes: u64) -> Self {
        Self {
            backend: backend.into(),
            entries,
            size_bytes,
            hits: 0,
            misses: 0,
        }
    }
}

/// Options for [`StorageBackend::cleanup`](crate::StorageBackend::cleanup).
///
/// Cleanup always removes entries whose TTL has elapsed. Setting
/// [`older_than`](Self::older_than) additionally removes entries stored longer ago than the
/// given age, regardless of their TTL.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tierstore_tier::CleanupOptions;
///
/// let options = CleanupOptions::new().older_than(Duration::from_secs(86_400)).dry_run();
/// assert_eq!(options.max_age, Some(Duration::from_secs(86_400)));
/// assert!(options.dry_run);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupOptions {
    /// Entries stored longer ago than this are removed even if they have not expired.
    pub max_age: Option<Duration>,
    /// Count what would be removed without removing anything.
    pub dry_run: bool,
}

impl CleanupOptions {
    /// Creates options that only remove expired entries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also removes entries stored longer ago than `age`.
    #[must_use]
    pub fn older_than(self, age: Duration) -> Self {
        Self {
            max_age: Some(age),
            ..self
        }
    }

    /// Reports what would be removed without removing it.
    #[must_use]
    pub fn dry_run(self) -> Self {
        Self { dry_run: true, ..self }
    }
}

/// Outcome of a cleanup pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Entries removed (or, for a dry run, that would have been removed).
    pub removed: u64,
    /// Entries left after the pass (or, for a dry run, that would have been left).
    pub remaining: u64,
}

impl CleanupReport {
    /// Adds another tier's report to this one.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            removed: self.removed + other.removed,
            remaining: self.remaining + other.remaining,
        }
    }
}
