// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Process-wide operational metrics.
//!
//! A [`MetricsService`] is created once and cloned into every collaborator that reports to
//! it. It keeps per-operation counters, cache hit totals, a bounded window of recent
//! durations per operation kind, and statistics for named middleware. Call
//! [`MetricsService::get_metrics`] for a detached snapshot.
//!
//! With the `metrics` feature, the service can additionally export every tracked operation
//! through OpenTelemetry.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant, SystemTime},
};

use parking_lot::Mutex;
use tick::Clock;

use crate::{
    StorageType,
    config::DEFAULT_SLOW_OPERATION_THRESHOLD,
    telemetry::{
        StorageActivity, StorageEvent,
        ext::{ClockExt, TimedResult},
    },
};

#[cfg(any(feature = "metrics", test))]
use crate::telemetry::metrics::OperationInstruments;

mod snapshot;

#[doc(inline)]
pub use snapshot::{
    ErrorDetail, MiddlewareMetrics, OperationKind, OperationStats, PerformanceStats, StorageMetrics, StorageTypeStats,
};

use snapshot::{mean, percentage};

/// Number of duration samples retained per operation kind.
pub const SAMPLE_WINDOW: usize = 1000;

/// A middleware failure handed to [`MetricsService::track_middleware_execution`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MiddlewareFailure {
    kind: String,
    message: String,
}

impl MiddlewareFailure {
    /// Creates a failure with an explicit kind and message.
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Describes `error`, using the error's type name as its kind.
    #[must_use]
    pub fn from_error<E: std::error::Error + ?Sized>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

#[derive(Debug, Default)]
struct KindState {
    stats: OperationStats,
    samples: VecDeque<Duration>,
}

impl KindState {
    fn record(&mut self, success: bool, duration: Duration) {
        self.stats.operations += 1;
        if !success {
            self.stats.errors += 1;
        }
        if self.samples.len() == SAMPLE_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
    }
}

#[derive(Debug)]
struct State {
    started_at: SystemTime,
    started: Instant,
    kinds: BTreeMap<OperationKind, KindState>,
    storage_types: BTreeMap<StorageType, StorageTypeStats>,
    cache_hits: u64,
    cache_misses: u64,
    middleware: BTreeMap<String, MiddlewareMetrics>,
}

impl State {
    fn new(clock: &Clock) -> Self {
        Self {
            started_at: clock.system_time(),
            started: clock.instant(),
            kinds: BTreeMap::new(),
            storage_types: BTreeMap::new(),
            cache_hits: 0,
            cache_misses: 0,
            middleware: BTreeMap::new(),
        }
    }

    fn performance(&self, uptime: Duration) -> PerformanceStats {
        let (total, count) = self
            .kinds
            .values()
            .flat_map(|kind| kind.samples.iter())
            .fold((Duration::ZERO, 0_u64), |(total, count), sample| (total.saturating_add(*sample), count + 1));
        let operations: u64 = self.kinds.values().map(|kind| kind.stats.operations).sum();
        let reads = self.cache_hits + self.cache_misses;

        #[expect(clippy::cast_precision_loss, reason = "throughput is approximate")]
        let operations_per_second = if uptime.is_zero() {
            0.0
        } else {
            operations as f64 / uptime.as_secs_f64()
        };

        PerformanceStats {
            average_response_time: mean(total, count),
            operations_per_second,
            cache_hits: self.cache_hits,
            cache_misses: self.cache_misses,
            hit_rate: percentage(self.cache_hits, reads),
            miss_rate: percentage(self.cache_misses, reads),
        }
    }
}

#[derive(Debug)]
struct MetricsInner {
    clock: Clock,
    slow_threshold: Duration,
    state: Mutex<State>,
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<OperationInstruments>,
}

/// Collects operation and middleware metrics for the whole process.
///
/// Clones share the same counters. All methods are synchronous and never hold the internal
/// lock across an `.await`.
///
/// # Examples
///
/// ```
/// # #[cfg(feature = "test-util")]
/// # fn main() {
/// use std::time::Duration;
///
/// use tick::Clock;
/// use tierstore::{MetricsService, OperationKind, StorageType};
///
/// let metrics = MetricsService::new(Clock::new_frozen());
/// assert_eq!(metrics.get_success_rate(OperationKind::Get), 100.0);
///
/// metrics.track_operation(OperationKind::Get, StorageType::Cache, true, Duration::from_millis(2), None);
/// metrics.track_operation(OperationKind::Get, StorageType::Persistent, false, Duration::from_millis(9), None);
///
/// assert_eq!(metrics.get_success_rate(OperationKind::Get), 50.0);
/// assert_eq!(metrics.get_metrics().operations[&OperationKind::Get].errors, 1);
/// # }
/// # #[cfg(not(feature = "test-util"))]
/// # fn main() {}
/// ```
#[derive(Clone, Debug)]
pub struct MetricsService {
    inner: Arc<MetricsInner>,
}

impl MetricsService {
    /// Creates a metrics service with the default slow-operation threshold.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self::builder(clock).build()
    }

    /// Creates a builder for a metrics service.
    #[must_use]
    pub fn builder(clock: Clock) -> MetricsServiceBuilder {
        MetricsServiceBuilder {
            clock,
            slow_threshold: DEFAULT_SLOW_OPERATION_THRESHOLD,
            #[cfg(any(feature = "metrics", test))]
            instruments: None,
        }
    }

    /// Records the outcome of one storage operation.
    ///
    /// `size_bytes` is the size of the value written, when the operation wrote one.
    pub fn track_operation(
        &self,
        kind: OperationKind,
        storage_type: StorageType,
        success: bool,
        duration: Duration,
        size_bytes: Option<u64>,
    ) {
        {
            let mut state = self.inner.state.lock();
            state.kinds.entry(kind).or_default().record(success, duration);

            let by_type = state.storage_types.entry(storage_type).or_default();
            by_type.operations += 1;
            if !success {
                by_type.errors += 1;
            }
            by_type.size_bytes = by_type.size_bytes.saturating_add(size_bytes.unwrap_or(0));
        }

        #[cfg(any(feature = "metrics", test))]
        if let Some(instruments) = &self.inner.instruments {
            instruments.record(kind, storage_type, success, duration);
        }
    }

    /// Records whether a read was served from the cache.
    pub fn track_cache_hit(&self, hit: bool) {
        let mut state = self.inner.state.lock();
        if hit {
            state.cache_hits += 1;
        } else {
            state.cache_misses += 1;
        }
    }

    /// Records one execution of the middleware called `name`.
    ///
    /// The middleware's statistics are created on its first execution. Executions slower than
    /// the slow-operation threshold are counted and logged as warnings. A failed execution
    /// increments the error count, and `error`, if given, becomes the latest error detail.
    pub fn track_middleware_execution(&self, name: &str, duration: Duration, success: bool, error: Option<MiddlewareFailure>) {
        let now = self.inner.clock.system_time();
        let slow = duration > self.inner.slow_threshold;
        let detail = error.map(|failure| ErrorDetail {
            message: failure.message,
            kind: failure.kind,
            timestamp: now,
        });

        {
            let mut state = self.inner.state.lock();
            state
                .middleware
                .entry(name.to_string())
                .or_insert_with(|| MiddlewareMetrics::first(name, duration, now))
                .record(duration, slow, !success, detail, now);
        }

        if slow {
            StorageEvent::new(StorageActivity::Slow, name)
                .duration(duration)
                .detail("slow middleware execution")
                .emit();
        }
    }

    /// Runs `future` as the middleware called `name`, tracking its duration and outcome.
    ///
    /// # Errors
    ///
    /// Returns the future's error unchanged.
    pub async fn time_middleware<T, E, F>(&self, name: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        let TimedResult { result, duration } = self.inner.clock.timed_async(future).await;
        match &result {
            Ok(_) => self.track_middleware_execution(name, duration, true, None),
            Err(e) => self.track_middleware_execution(name, duration, false, Some(MiddlewareFailure::from_error(e))),
        }
        result
    }

    /// Returns a snapshot of everything tracked so far.
    #[must_use]
    pub fn get_metrics(&self) -> StorageMetrics {
        let now = self.inner.clock.instant();
        let state = self.inner.state.lock();
        let uptime = now.saturating_duration_since(state.started);

        StorageMetrics {
            operations: OperationKind::ALL
                .into_iter()
                .map(|kind| (kind, state.kinds.get(&kind).map(|k| k.stats).unwrap_or_default()))
                .collect(),
            storage_types: [StorageType::Persistent, StorageType::Cache, StorageType::Hybrid]
                .into_iter()
                .map(|storage_type| (storage_type, state.storage_types.get(&storage_type).copied().unwrap_or_default()))
                .collect(),
            performance: state.performance(uptime),
            started_at: state.started_at,
            uptime,
            middleware: state.middleware.clone(),
        }
    }

    /// Returns a snapshot of middleware statistics, either of every middleware or of
    /// the one called `name`.
    #[must_use]
    pub fn get_middleware_metrics(&self, name: Option<&str>) -> BTreeMap<String, MiddlewareMetrics> {
        let state = self.inner.state.lock();
        match name {
            Some(name) => state
                .middleware
                .get_key_value(name)
                .map(|(k, v)| (k.clone(), v.clone()))
                .into_iter()
                .collect(),
            None => state.middleware.clone(),
        }
    }

    /// Zeroes every counter and restarts the uptime clock.
    pub fn reset_metrics(&self) {
        *self.inner.state.lock() = State::new(&self.inner.clock);
        StorageEvent::new(StorageActivity::MetricsReset, "reset_metrics").emit();
    }

    /// Forgets the statistics of every middleware, or only of the one called `name`.
    pub fn reset_middleware_metrics(&self, name: Option<&str>) {
        let mut state = self.inner.state.lock();
        match name {
            Some(name) => {
                state.middleware.remove(name);
            }
            None => state.middleware.clear(),
        }
    }

    /// Returns the percentage of successful calls of `kind`, or 100 if there were none.
    #[must_use]
    pub fn get_success_rate(&self, kind: OperationKind) -> f64 {
        let stats = self.inner.state.lock().kinds.get(&kind).map(|k| k.stats).unwrap_or_default();
        success_rate(stats.operations, stats.errors)
    }

    /// Returns the percentage of successful calls across every kind, or 100 if there were none.
    #[must_use]
    pub fn get_overall_success_rate(&self) -> f64 {
        let state = self.inner.state.lock();
        let (operations, errors) = state
            .kinds
            .values()
            .fold((0, 0), |(ops, errs), kind| (ops + kind.stats.operations, errs + kind.stats.errors));
        success_rate(operations, errors)
    }
}

fn success_rate(operations: u64, errors: u64) -> f64 {
    if operations == 0 {
        return 100.0;
    }
    percentage(operations.saturating_sub(errors), operations)
}

/// Builder for [`MetricsService`].
#[derive(Debug)]
pub struct MetricsServiceBuilder {
    clock: Clock,
    slow_threshold: Duration,
    #[cfg(any(feature = "metrics", test))]
    instruments: Option<OperationInstruments>,
}

impl MetricsServiceBuilder {
    /// Sets the duration above which a middleware execution counts as slow.
    #[must_use]
    pub fn slow_threshold(self, threshold: Duration) -> Self {
        Self {
            slow_threshold: threshold,
            ..self
        }
    }

    /// Exports every tracked operation through the given OpenTelemetry meter provider.
    #[cfg(any(feature = "metrics", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[must_use]
    pub fn meter_provider(self, meter_provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            instruments: Some(OperationInstruments::new(meter_provider)),
            ..self
        }
    }

    /// Builds the metrics service.
    #[must_use]
    pub fn build(self) -> MetricsService {
        MetricsService {
            inner: Arc::new(MetricsInner {
                state: Mutex::new(State::new(&self.clock)),
                clock: self.clock,
                slow_threshold: self.slow_threshold,
                #[cfg(any(feature = "metrics", test))]
                instruments: self.instruments,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tick::ClockControl;

    use super::*;
    use crate::telemetry::{
        attributes,
        testing::{ExportedOperations, LogCapture},
    };

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn success_rate_without_operations_is_100() {
        let metrics = MetricsService::new(Clock::new_frozen());

        assert_close(metrics.get_success_rate(OperationKind::Delete), 100.0);
        assert_close(metrics.get_overall_success_rate(), 100.0);
    }

    #[test]
    fn success_rates_count_errors() {
        let metrics = MetricsService::new(Clock::new_frozen());
        for success in [true, true, true, false] {
            metrics.track_operation(OperationKind::Set, StorageType::Hybrid, success, Duration::ZERO, Some(10));
        }
        metrics.track_operation(OperationKind::Get, StorageType::Cache, false, Duration::ZERO, None);

        assert_close(metrics.get_success_rate(OperationKind::Set), 75.0);
        assert_close(metrics.get_success_rate(OperationKind::Get), 0.0);
        assert_close(metrics.get_overall_success_rate(), 60.0);
    }

    #[test]
    fn snapshot_lists_every_kind_and_storage_type() {
        let metrics = MetricsService::new(Clock::new_frozen());
        metrics.track_operation(OperationKind::Set, StorageType::Cache, true, Duration::ZERO, Some(7));
        metrics.track_operation(OperationKind::Set, StorageType::Cache, false, Duration::ZERO, Some(3));

        let snapshot = metrics.get_metrics();

        assert_eq!(snapshot.operations.len(), OperationKind::ALL.len());
        assert_eq!(snapshot.operations[&OperationKind::Sync], OperationStats::default());
        assert_eq!(
            snapshot.storage_types[&StorageType::Cache],
            StorageTypeStats {
                operations: 2,
                errors: 1,
                size_bytes: 10
            }
        );
        assert_eq!(snapshot.storage_types[&StorageType::Persistent], StorageTypeStats::default());
        assert_eq!(snapshot.total_operations(), 2);
        assert_eq!(snapshot.total_errors(), 1);
    }

    #[test]
    fn performance_stats() {
        let control = ClockControl::new();
        let metrics = MetricsService::new(control.to_clock());
        metrics.track_operation(OperationKind::Get, StorageType::Cache, true, Duration::from_millis(10), None);
        metrics.track_operation(OperationKind::Set, StorageType::Cache, true, Duration::from_millis(30), None);
        metrics.track_cache_hit(true);
        metrics.track_cache_hit(true);
        metrics.track_cache_hit(true);
        metrics.track_cache_hit(false);
        control.advance(Duration::from_secs(4));

        let performance = metrics.get_metrics().performance;

        assert_eq!(performance.average_response_time, Duration::from_millis(20));
        assert_close(performance.operations_per_second, 0.5);
        assert_eq!((performance.cache_hits, performance.cache_misses), (3, 1));
        assert_close(performance.hit_rate, 75.0);
        assert_close(performance.miss_rate, 25.0);
    }

    #[test]
    fn samples_are_bounded_per_kind() {
        let metrics = MetricsService::new(Clock::new_frozen());
        for _ in 0..SAMPLE_WINDOW {
            metrics.track_operation(OperationKind::Get, StorageType::Cache, true, Duration::from_millis(100), None);
        }
        for _ in 0..SAMPLE_WINDOW {
            metrics.track_operation(OperationKind::Get, StorageType::Cache, true, Duration::from_millis(10), None);
        }

        let snapshot = metrics.get_metrics();

        assert_eq!(snapshot.operations[&OperationKind::Get].operations, 2 * SAMPLE_WINDOW as u64);
        assert_eq!(snapshot.performance.average_response_time, Duration::from_millis(10));
    }

    #[test]
    fn uptime_follows_clock() {
        let control = ClockControl::new();
        let metrics = MetricsService::new(control.to_clock());
        let started_at = metrics.get_metrics().started_at;

        control.advance(Duration::from_secs(90));

        let snapshot = metrics.get_metrics();
        assert_eq!(snapshot.uptime, Duration::from_secs(90));
        assert_eq!(snapshot.started_at, started_at);
    }

    #[test]
    fn snapshots_are_detached() {
        let metrics = MetricsService::new(Clock::new_frozen());
        let before = metrics.get_metrics();

        metrics.track_operation(OperationKind::Exists, StorageType::Cache, true, Duration::ZERO, None);

        assert_eq!(before.total_operations(), 0);
        assert_eq!(metrics.get_metrics().total_operations(), 1);
    }

    #[test]
    fn middleware_durations_aggregate() {
        let metrics = MetricsService::new(Clock::new_frozen());
        for millis in [1500, 200, 300] {
            metrics.track_middleware_execution("auth", Duration::from_millis(millis), true, None);
        }

        let middleware = metrics.get_middleware_metrics(Some("auth"));
        let auth = &middleware["auth"];

        assert_eq!(auth.request_count, 3);
        assert_eq!(auth.slow_operations, 1);
        assert_eq!(auth.min_duration, Duration::from_millis(200));
        assert_eq!(auth.max_duration, Duration::from_millis(1500));
        assert_eq!(auth.average_duration, Duration::from_millis(2000) / 3);
        assert_eq!(auth.total_duration, Duration::from_millis(2000));
        assert_eq!(auth.error_count, 0);
    }

    #[test]
    fn slow_middleware_is_a_warning() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());
        let metrics = MetricsService::new(Clock::new_frozen());

        metrics.track_middleware_execution("rate_limit", Duration::from_millis(1001), true, None);

        capture.assert_event(StorageActivity::Slow);
        capture.assert_field(attributes::STORAGE_OPERATION_NAME, "rate_limit");
    }

    #[test]
    fn exactly_threshold_is_not_slow() {
        let metrics = MetricsService::builder(Clock::new_frozen())
            .slow_threshold(Duration::from_millis(50))
            .build();

        metrics.track_middleware_execution("m", Duration::from_millis(50), true, None);
        metrics.track_middleware_execution("m", Duration::from_millis(51), true, None);

        assert_eq!(metrics.get_middleware_metrics(Some("m"))["m"].slow_operations, 1);
    }

    #[test]
    fn middleware_failures_keep_latest_error() {
        let control = ClockControl::new();
        let metrics = MetricsService::new(control.to_clock());

        metrics.track_middleware_execution("auth", Duration::ZERO, false, Some(MiddlewareFailure::new("Timeout", "first")));
        control.advance(Duration::from_secs(1));
        metrics.track_middleware_execution("auth", Duration::ZERO, false, Some(MiddlewareFailure::new("Denied", "second")));
        metrics.track_middleware_execution("auth", Duration::ZERO, true, None);

        let middleware = metrics.get_middleware_metrics(None);
        let auth = &middleware["auth"];
        let last = auth.last_error.as_ref().expect("error recorded");

        assert_eq!(auth.error_count, 2);
        assert_eq!(last.message, "second");
        assert_eq!(last.kind, "Denied");
        assert_eq!(last.timestamp, auth.last_executed);
    }

    #[test]
    fn successful_middleware_ignores_error_detail() {
        let metrics = MetricsService::new(Clock::new_frozen());

        metrics.track_middleware_execution("cors", Duration::ZERO, true, Some(MiddlewareFailure::new("Warning", "retried")));

        let middleware = metrics.get_middleware_metrics(Some("cors"));
        assert_eq!(middleware["cors"].error_count, 0);
        assert_eq!(middleware["cors"].last_error, None);
    }

    #[test]
    fn time_middleware_tracks_result() {
        futures::executor::block_on(async {
            let control = ClockControl::new();
            let metrics = MetricsService::new(control.to_clock());

            let ok: Result<u32, io::Error> = metrics
                .time_middleware("load", async {
                    control.advance(Duration::from_millis(40));
                    Ok(7)
                })
                .await;
            let err: Result<u32, io::Error> = metrics
                .time_middleware("load", async { Err(io::Error::other("backend down")) })
                .await;

            assert_eq!(ok.expect("middleware succeeded"), 7);
            assert_eq!(err.expect_err("middleware failed").to_string(), "backend down");

            let middleware = metrics.get_middleware_metrics(Some("load"));
            let load = &middleware["load"];
            assert_eq!(load.request_count, 2);
            assert_eq!(load.error_count, 1);
            assert_eq!(load.max_duration, Duration::from_millis(40));
            let last = load.last_error.as_ref().expect("error recorded");
            assert_eq!(last.kind, "Error");
            assert_eq!(last.message, "backend down");
        });
    }

    #[test]
    fn reset_metrics_zeroes_everything() {
        let control = ClockControl::new();
        let metrics = MetricsService::new(control.to_clock());
        metrics.track_operation(OperationKind::Get, StorageType::Cache, true, Duration::from_millis(5), None);
        metrics.track_cache_hit(true);
        metrics.track_middleware_execution("auth", Duration::ZERO, true, None);
        control.advance(Duration::from_secs(60));

        metrics.reset_metrics();
        let snapshot = metrics.get_metrics();

        assert_eq!(snapshot.total_operations(), 0);
        assert_eq!(snapshot.performance.cache_hits, 0);
        assert!(snapshot.middleware.is_empty());
        assert_eq!(snapshot.uptime, Duration::ZERO);
        assert_eq!(snapshot.started_at, control.to_clock().system_time());
    }

    #[test]
    fn reset_middleware_metrics_by_name() {
        let metrics = MetricsService::new(Clock::new_frozen());
        metrics.track_middleware_execution("auth", Duration::ZERO, true, None);
        metrics.track_middleware_execution("cors", Duration::ZERO, true, None);

        metrics.reset_middleware_metrics(Some("auth"));
        assert_eq!(metrics.get_middleware_metrics(None).keys().collect::<Vec<_>>(), vec!["cors"]);

        metrics.reset_middleware_metrics(None);
        assert!(metrics.get_middleware_metrics(None).is_empty());
    }

    #[test]
    fn unknown_middleware_yields_empty_map() {
        let metrics = MetricsService::new(Clock::new_frozen());
        assert!(metrics.get_middleware_metrics(Some("missing")).is_empty());
    }

    #[test]
    fn clones_share_counters() {
        let metrics = MetricsService::new(Clock::new_frozen());
        let clone = metrics.clone();

        clone.track_operation(OperationKind::Clear, StorageType::Hybrid, true, Duration::ZERO, None);

        assert_eq!(metrics.get_metrics().operations[&OperationKind::Clear].operations, 1);
    }

    #[test]
    fn short_type_name_strips_path_and_generics() {
        assert_eq!(short_type_name::<io::Error>(), "Error");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }

    #[test]
    fn operations_are_exported_through_opentelemetry() {
        let exported = ExportedOperations::new();
        let metrics = MetricsService::builder(Clock::new_frozen())
            .meter_provider(exported.meter_provider())
            .build();

        metrics.track_operation(OperationKind::Invalidate, StorageType::Persistent, true, Duration::from_millis(1), None);
        metrics.track_operation(OperationKind::Get, StorageType::Cache, false, Duration::from_millis(2), None);

        exported.assert_operation(OperationKind::Invalidate, StorageType::Persistent, true);
        exported.assert_operation(OperationKind::Get, StorageType::Cache, false);
    }
}
