// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Helpers for timing operations and shaping their results.

use ohno::ErrorExt;
use tick::{Clock, Stopwatch};
use tierstore_tier::Error;

use crate::{StorageOperationResult, StorageType};

/// Formats a tier error for a result's `error` field.
///
/// The message names the tier and the operation, followed by the error's own message
/// without any backtrace.
#[must_use]
pub fn format_error(tier: StorageType, operation: &str, error: &Error) -> String {
    format!("{tier} {operation} failed: {}", error.message())
}

/// Measures one storage operation and stamps its result.
///
/// Started once per public call, so the reported duration covers every tier consulted.
#[derive(Debug)]
pub(crate) struct OperationTimer<'a> {
    clock: &'a Clock,
    stopwatch: Stopwatch,
}

impl<'a> OperationTimer<'a> {
    pub fn start(clock: &'a Clock) -> Self {
        Self {
            clock,
            stopwatch: clock.stopwatch(),
        }
    }

    pub fn success<T>(&self, data: Option<T>, storage_type: StorageType) -> StorageOperationResult<T> {
        StorageOperationResult::new(true, data, None, storage_type, self.stopwatch.elapsed(), self.clock.system_time())
    }

    pub fn failure<T>(&self, error: impl Into<String>, storage_type: StorageType) -> StorageOperationResult<T> {
        self.partial(None, error, storage_type)
    }

    /// A failed result that still carries data, such as a report of partial progress.
    pub fn partial<T>(&self, data: Option<T>, error: impl Into<String>, storage_type: StorageType) -> StorageOperationResult<T> {
        StorageOperationResult::new(
            false,
            data,
            Some(error.into()),
            storage_type,
            self.stopwatch.elapsed(),
            self.clock.system_time(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tick::ClockControl;

    use super::*;

    #[test]
    fn format_error_names_tier_and_operation() {
        let error = Error::from_message("disk full");

        let message = format_error(StorageType::Persistent, "set", &error);

        assert!(message.starts_with("persistent set failed: "), "{message}");
        assert!(message.contains("disk full"), "{message}");
    }

    #[test]
    fn timer_measures_elapsed_time() {
        let control = ClockControl::new();
        let clock = control.to_clock();
        let timer = OperationTimer::start(&clock);

        control.advance(Duration::from_millis(250));
        let result = timer.success(Some("v"), StorageType::Cache);

        assert!(result.is_success());
        assert_eq!(result.duration(), Duration::from_millis(250));
        assert_eq!(result.timestamp(), clock.system_time());
        assert_eq!(result.error(), None);
    }

    #[test]
    fn failure_has_message_and_no_data() {
        let clock = Clock::new_frozen();
        let result = OperationTimer::start(&clock).failure::<u32>("boom", StorageType::Hybrid);

        assert!(!result.is_success());
        assert_eq!(result.error(), Some("boom"));
        assert_eq!(result.data(), None);
        assert_eq!(result.storage_type(), StorageType::Hybrid);
    }

    #[test]
    fn partial_keeps_data() {
        let clock = Clock::new_frozen();
        let result = OperationTimer::start(&clock).partial(Some(3), "1 key failed", StorageType::Cache);

        assert!(!result.is_success());
        assert_eq!(result.into_data(), Some(3));
    }
}
