// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{
    collections::BTreeMap,
    fmt::Display,
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

use crate::StorageType;

/// The storage operations tracked by the metrics service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// A write.
    Set,
    /// A read.
    Get,
    /// A removal of one key.
    Delete,
    /// An existence check.
    Exists,
    /// A removal of every key.
    Clear,
    /// A listing of keys.
    GetKeys,
    /// A removal of the keys matching a pattern.
    Invalidate,
    /// A read that produces and stores the value on a miss.
    GetOrSet,
    /// A statistics query.
    GetStats,
    /// A removal of expired or aged entries.
    Cleanup,
    /// A copy of entries between tiers.
    Sync,
}

impl OperationKind {
    /// Every operation kind, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Set,
        Self::Get,
        Self::Delete,
        Self::Exists,
        Self::Clear,
        Self::GetKeys,
        Self::Invalidate,
        Self::GetOrSet,
        Self::GetStats,
        Self::Cleanup,
        Self::Sync,
    ];

    /// Returns the name used in logs and metric attributes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Get => "get",
            Self::Delete => "delete",
            Self::Exists => "exists",
            Self::Clear => "clear",
            Self::GetKeys => "get_keys",
            Self::Invalidate => "invalidate",
            Self::GetOrSet => "get_or_set",
            Self::GetStats => "get_stats",
            Self::Cleanup => "cleanup",
            Self::Sync => "sync",
        }
    }
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters of one operation kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationStats {
    /// Calls made.
    pub operations: u64,
    /// Calls that failed.
    pub errors: u64,
}

/// Counters of one storage type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageTypeStats {
    /// Calls satisfied by this storage type.
    pub operations: u64,
    /// Failed calls attributed to this storage type.
    pub errors: u64,
    /// Total size of the values written, in bytes.
    pub size_bytes: u64,
}

/// Aggregate performance figures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    /// Mean duration over the retained samples of every operation kind.
    pub average_response_time: Duration,
    /// Operations per second since the metrics were started or last reset.
    pub operations_per_second: f64,
    /// Reads served from the cache.
    pub cache_hits: u64,
    /// Reads not served from the cache.
    pub cache_misses: u64,
    /// Percentage of reads served from the cache.
    pub hit_rate: f64,
    /// Percentage of reads not served from the cache.
    pub miss_rate: f64,
}

/// Details of the most recent failure of a middleware.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// The error's message.
    pub message: String,
    /// A short name for the kind of error.
    pub kind: String,
    /// When the error was recorded.
    pub timestamp: SystemTime,
}

/// Execution statistics of one named middleware.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiddlewareMetrics {
    /// The middleware's name.
    pub name: String,
    /// Executions recorded.
    pub request_count: u64,
    /// Sum of all execution durations.
    pub total_duration: Duration,
    /// Mean execution duration.
    pub average_duration: Duration,
    /// Shortest execution.
    pub min_duration: Duration,
    /// Longest execution.
    pub max_duration: Duration,
    /// Executions slower than the slow-operation threshold.
    pub slow_operations: u64,
    /// Failed executions.
    pub error_count: u64,
    /// The most recent failure, if any.
    pub last_error: Option<ErrorDetail>,
    /// When the middleware last ran.
    pub last_executed: SystemTime,
}

impl MiddlewareMetrics {
    pub(crate) fn first(name: &str, duration: Duration, now: SystemTime) -> Self {
        Self {
            name: name.to_string(),
            request_count: 0,
            total_duration: Duration::ZERO,
            average_duration: Duration::ZERO,
            min_duration: duration,
            max_duration: duration,
            slow_operations: 0,
            error_count: 0,
            last_error: None,
            last_executed: now,
        }
    }

    pub(crate) fn record(&mut self, duration: Duration, slow: bool, failed: bool, error: Option<ErrorDetail>, now: SystemTime) {
        self.request_count += 1;
        self.total_duration = self.total_duration.saturating_add(duration);
        self.average_duration = mean(self.total_duration, self.request_count);
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.last_executed = now;

        if slow {
            self.slow_operations += 1;
        }
        if failed {
            self.error_count += 1;
            if error.is_some() {
                self.last_error = error;
            }
        }
    }
}

/// A point-in-time copy of everything the metrics service has tracked.
///
/// Snapshots are detached from the service; later operations do not change them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageMetrics {
    /// Counters per operation kind. Kinds that were never called are present with zero counts.
    pub operations: BTreeMap<OperationKind, OperationStats>,
    /// Counters per storage type.
    pub storage_types: BTreeMap<StorageType, StorageTypeStats>,
    /// Aggregate performance figures.
    pub performance: PerformanceStats,
    /// When tracking started or was last reset.
    pub started_at: SystemTime,
    /// Time elapsed since `started_at`.
    pub uptime: Duration,
    /// Statistics of every named middleware.
    pub middleware: BTreeMap<String, MiddlewareMetrics>,
}

impl StorageMetrics {
    /// Returns the total number of tracked operations across every kind.
    #[must_use]
    pub fn total_operations(&self) -> u64 {
        self.operations.values().map(|stats| stats.operations).sum()
    }

    /// Returns the total number of failed operations across every kind.
    #[must_use]
    pub fn total_errors(&self) -> u64 {
        self.operations.values().map(|stats| stats.errors).sum()
    }
}

pub(crate) fn mean(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

pub(crate) fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    #[expect(clippy::cast_precision_loss, reason = "rates are approximate")]
    let rate = part as f64 / whole as f64 * 100.0;
    rate
}
