// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration for the storage manager.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How long an entry copied from the persistent tier into the cache tier lives.
pub const DEFAULT_WRITE_BACK_TTL: Duration = Duration::from_secs(300);

/// Key prefix selecting cache entries that are pushed to the persistent tier by a sync.
pub const DEFAULT_SYNC_PREFIX: &str = "important_";

/// Operations taking longer than this are logged as slow.
pub const DEFAULT_SLOW_OPERATION_THRESHOLD: Duration = Duration::from_millis(1000);

/// Order in which the tiers are consulted by a read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Consult the cache first and fall back to the persistent tier.
    ///
    /// A value found only in the persistent tier is copied back into the cache.
    #[default]
    CacheFirst,
    /// Consult the persistent tier first and fall back to the cache.
    PersistentFirst,
    /// Consult both tiers concurrently, preferring the cache's answer.
    Both,
}

/// The tier or tiers a write goes to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    /// Write to the cache only.
    Cache,
    /// Write to the persistent tier only.
    Persistent,
    /// Write to both tiers concurrently.
    #[default]
    Hybrid,
}

impl WriteStrategy {
    /// The tier or tiers this strategy writes to.
    pub(crate) fn storage_type(self) -> crate::StorageType {
        match self {
            Self::Cache => crate::StorageType::Cache,
            Self::Persistent => crate::StorageType::Persistent,
            Self::Hybrid => crate::StorageType::Hybrid,
        }
    }
}

/// Settings of a [`StorageManager`](crate::StorageManager).
///
/// The configuration is fixed once the manager is built. It can be embedded in an
/// application's own configuration file; missing fields take their defaults.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tierstore::StorageConfig;
///
/// let config = StorageConfig::default()
///     .with_sync(false)
///     .with_write_back_ttl(Duration::from_secs(60));
///
/// assert!(config.metrics_enabled());
/// assert!(!config.sync_enabled());
/// assert_eq!(config.sync_prefix(), "important_");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    enable_metrics: bool,
    enable_sync: bool,
    #[serde(with = "millis")]
    write_back_ttl: Duration,
    sync_prefix: String,
    #[serde(with = "millis")]
    slow_operation_threshold: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
            enable_sync: true,
            write_back_ttl: DEFAULT_WRITE_BACK_TTL,
            sync_prefix: DEFAULT_SYNC_PREFIX.to_string(),
            slow_operation_threshold: DEFAULT_SLOW_OPERATION_THRESHOLD,
        }
    }
}

impl StorageConfig {
    /// Enables or disables reporting of operations to the metrics service.
    #[must_use]
    pub fn with_metrics(self, enabled: bool) -> Self {
        Self {
            enable_metrics: enabled,
            ..self
        }
    }

    /// Enables or disables [`sync`](crate::StorageManager::sync).
    #[must_use]
    pub fn with_sync(self, enabled: bool) -> Self {
        Self {
            enable_sync: enabled,
            ..self
        }
    }

    /// Sets the time-to-live of entries copied into the cache by reads and syncs.
    #[must_use]
    pub fn with_write_back_ttl(self, ttl: Duration) -> Self {
        Self {
            write_back_ttl: ttl,
            ..self
        }
    }

    /// Sets the key prefix selecting cache entries pushed to the persistent tier.
    #[must_use]
    pub fn with_sync_prefix(self, prefix: impl Into<String>) -> Self {
        Self {
            sync_prefix: prefix.into(),
            ..self
        }
    }

    /// Sets the duration above which an operation is logged as slow.
    #[must_use]
    pub fn with_slow_operation_threshold(self, threshold: Duration) -> Self {
        Self {
            slow_operation_threshold: threshold,
            ..self
        }
    }

    /// Returns whether operations are reported to the metrics service.
    #[must_use]
    pub fn metrics_enabled(&self) -> bool {
        self.enable_metrics
    }

    /// Returns whether syncing between tiers is allowed.
    #[must_use]
    pub fn sync_enabled(&self) -> bool {
        self.enable_sync
    }

    /// Returns the time-to-live of entries copied into the cache.
    #[must_use]
    pub fn write_back_ttl(&self) -> Duration {
        self.write_back_ttl
    }

    /// Returns the key prefix of entries pushed to the persistent tier.
    #[must_use]
    pub fn sync_prefix(&self) -> &str {
        &self.sync_prefix
    }

    /// Returns the duration above which an operation is slow.
    #[must_use]
    pub fn slow_operation_threshold(&self) -> Duration {
        self.slow_operation_threshold
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
