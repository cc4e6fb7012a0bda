// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured logging of storage activity.
//!
//! Every event is a `tracing` event named `storage.event` carrying dotted fields
//! (`storage.operation`, `storage.tier`, `storage.key`, `storage.duration_ms`). Routine
//! outcomes are logged at debug level; slow operations and failures that were recovered
//! from or swallowed are warnings; operations that failed outright are errors.

use std::time::Duration;

use tracing::Level;

use crate::StorageType;

pub(crate) mod attributes;
pub(crate) mod ext;
#[cfg(any(feature = "metrics", test))]
pub(crate) mod metrics;
#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StorageActivity {
    Ok,
    Hit,
    Miss,
    Failed,
    Slow,
    WriteBack,
    WriteBackFailed,
    WriteBackSkipped,
    StoreFailed,
    SyncFailed,
    TierFailed,
    MetricsReset,
}

impl StorageActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "storage.ok",
            Self::Hit => "storage.hit",
            Self::Miss => "storage.miss",
            Self::Failed => "storage.failed",
            Self::Slow => "storage.slow",
            Self::WriteBack => "storage.write_back",
            Self::WriteBackFailed => "storage.write_back_failed",
            Self::WriteBackSkipped => "storage.write_back_skipped",
            Self::StoreFailed => "storage.store_failed",
            Self::SyncFailed => "storage.sync_failed",
            Self::TierFailed => "storage.tier_failed",
            Self::MetricsReset => "storage.metrics_reset",
        }
    }

    pub fn level(self) -> Level {
        match self {
            Self::Ok | Self::Hit | Self::Miss | Self::WriteBack => Level::DEBUG,
            Self::MetricsReset => Level::INFO,
            Self::Slow
            | Self::WriteBackFailed
            | Self::WriteBackSkipped
            | Self::StoreFailed
            | Self::SyncFailed
            | Self::TierFailed => Level::WARN,
            Self::Failed => Level::ERROR,
        }
    }
}

/// One structured storage event.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StorageEvent<'a> {
    pub activity: StorageActivity,
    pub operation: &'a str,
    pub storage_type: Option<StorageType>,
    pub key: Option<&'a str>,
    pub duration: Option<Duration>,
    pub detail: Option<&'a str>,
}

impl<'a> StorageEvent<'a> {
    pub fn new(activity: StorageActivity, operation: &'a str) -> Self {
        Self {
            activity,
            operation,
            storage_type: None,
            key: None,
            duration: None,
            detail: None,
        }
    }

    pub fn storage_type(self, storage_type: StorageType) -> Self {
        Self {
            storage_type: Some(storage_type),
            ..self
        }
    }

    pub fn key(self, key: &'a str) -> Self {
        Self { key: Some(key), ..self }
    }

    pub fn duration(self, duration: Duration) -> Self {
        Self {
            duration: Some(duration),
            ..self
        }
    }

    pub fn detail(self, detail: &'a str) -> Self {
        Self {
            detail: Some(detail),
            ..self
        }
    }

    pub fn emit(self) {
        let activity = self.activity.as_str();
        let operation = self.operation;
        let storage_type = self.storage_type.map(StorageType::as_str);
        let key = self.key;
        let duration_ms = self.duration.map(|d| d.as_secs_f64() * 1000.0);
        let detail = self.detail;

        // Tracing level must be constant, so we use a macro to select the appropriate level.
        // Field names must match constants in attributes.rs - see log_fields_match_attribute_names test.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    storage.activity = activity,
                    storage.operation = operation,
                    storage.tier = storage_type,
                    storage.key = key,
                    storage.duration_ms = duration_ms,
                    storage.detail = detail,
                    "storage.event"
                )
            };
        }

        let level = self.activity.level();
        if level == Level::ERROR {
            emit_event!(error);
        } else if level == Level::WARN {
            emit_event!(warn);
        } else if level == Level::INFO {
            emit_event!(info);
        } else {
            emit_event!(debug);
        }
    }
}

/// Logs the outcome of a completed operation.
///
/// Slow operations are warned about even when they succeeded.
pub(crate) fn log_operation(
    operation: &str,
    storage_type: StorageType,
    key: Option<&str>,
    duration: Duration,
    error: Option<&str>,
    slow_threshold: Duration,
) {
    let activity = match error {
        Some(_) => StorageActivity::Failed,
        None if duration > slow_threshold => StorageActivity::Slow,
        None => StorageActivity::Ok,
    };

    let mut event = StorageEvent::new(activity, operation)
        .storage_type(storage_type)
        .duration(duration);
    if let Some(key) = key {
        event = event.key(key);
    }
    if let Some(error) = error {
        event = event.detail(error);
    }
    event.emit();
}
