// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Uniform outcome type returned by every storage operation.

use std::{
    fmt::Display,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

/// The tier or tiers that satisfied an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    /// The durable tier.
    Persistent,
    /// The volatile tier.
    Cache,
    /// Both tiers took part.
    Hybrid,
}

impl StorageType {
    /// Returns the name used in logs and metric attributes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "persistent",
            Self::Cache => "cache",
            Self::Hybrid => "hybrid",
        }
    }

    /// Combines the outcome of an operation issued to both tiers.
    ///
    /// Returns `None` when neither tier succeeded.
    #[must_use]
    pub(crate) fn from_outcomes(cache_ok: bool, persistent_ok: bool) -> Option<Self> {
        match (cache_ok, persistent_ok) {
            (true, true) => Some(Self::Hybrid),
            (true, false) => Some(Self::Cache),
            (false, true) => Some(Self::Persistent),
            (false, false) => None,
        }
    }
}

impl Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a storage operation.
///
/// Storage operations never return errors. Failures of individual tiers are reconciled
/// according to the operation's strategy, and whatever remains is reported here as
/// `success == false` together with a human readable message.
///
/// Results are immutable once built. `duration` is the wall-clock time of the whole call,
/// measured once regardless of how many tiers were consulted, and `storage_type` names the
/// tier or tiers that actually satisfied the call.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # fn main() {
/// use tick::Clock;
/// use tierstore::{ReadStrategy, StorageManager, StorageType};
/// use tierstore::testing::MockBackend;
/// # futures::executor::block_on(async {
///
/// let manager = StorageManager::builder(Clock::new_frozen())
///     .cache(MockBackend::named("cache"))
///     .persistent(MockBackend::named("persistent"))
///     .build();
///
/// let result = manager.get("missing", |_: &String| true, ReadStrategy::CacheFirst).await;
/// assert!(result.is_success());
/// assert_eq!(result.data(), None);
/// # });
/// # }
/// # #[cfg(not(feature = "test-util"))]
/// # fn main() {}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOperationResult<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
    duration: Duration,
    storage_type: StorageType,
    timestamp: SystemTime,
}

impl<T> StorageOperationResult<T> {
    pub(crate) fn new(
        success: bool,
        data: Option<T>,
        error: Option<String>,
        storage_type: StorageType,
        duration: Duration,
        timestamp: SystemTime,
    ) -> Self {
        Self {
            success,
            data,
            error,
            duration,
            storage_type,
            timestamp,
        }
    }

    /// Returns `true` when the operation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the data produced by the operation, if any.
    #[must_use]
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    /// Consumes the result, returning the data produced by the operation, if any.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Returns the failure message, if the operation failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns how long the operation took.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the tier or tiers that satisfied the operation.
    #[must_use]
    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    /// Returns when the operation completed.
    #[must_use]
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Transforms the data while keeping every other field.
    #[must_use]
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StorageOperationResult<U> {
        StorageOperationResult {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            duration: self.duration,
            storage_type: self.storage_type,
            timestamp: self.timestamp,
        }
    }
}
