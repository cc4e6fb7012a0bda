// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Capture helpers for asserting on storage events and exported instruments.

use std::{io::Write, sync::Arc};

use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::{
    InMemoryMetricExporter, SdkMeterProvider,
    data::{AggregatedMetrics, Metric, MetricData, ResourceMetrics, ScopeMetrics},
};
use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;

use super::{
    StorageActivity, attributes,
    metrics::{OPERATION_COUNT_NAME, OPERATION_DURATION_NAME},
};
use crate::{OperationKind, StorageType};

/// One exported data point of a `tierstore` instrument.
#[derive(Debug)]
pub(crate) struct ExportedPoint {
    pub instrument: String,
    pub attributes: Vec<KeyValue>,
}

impl ExportedPoint {
    fn describes(&self, kind: OperationKind, storage_type: StorageType, success: bool) -> bool {
        [
            KeyValue::new(attributes::STORAGE_OPERATION_NAME, kind.as_str()),
            KeyValue::new(attributes::STORAGE_TIER_NAME, storage_type.as_str()),
            KeyValue::new(attributes::STORAGE_SUCCESS_NAME, success),
        ]
        .iter()
        .all(|expected| self.attributes.contains(expected))
    }
}

/// Meter provider exporting into memory, for asserting on the operation instruments.
#[derive(Debug)]
pub(crate) struct ExportedOperations {
    exporter: InMemoryMetricExporter,
    provider: SdkMeterProvider,
}

impl ExportedOperations {
    pub fn new() -> Self {
        let exporter = InMemoryMetricExporter::default();
        Self {
            provider: SdkMeterProvider::builder().with_periodic_exporter(exporter.clone()).build(),
            exporter,
        }
    }

    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    /// Flushes the provider and returns every counter and histogram point exported so far.
    pub fn points(&self) -> Vec<ExportedPoint> {
        self.provider.force_flush().expect("flushing the meter provider failed");
        self.exporter
            .get_finished_metrics()
            .expect("reading exported metrics failed")
            .iter()
            .flat_map(ResourceMetrics::scope_metrics)
            .flat_map(ScopeMetrics::metrics)
            .flat_map(points_of)
            .collect()
    }

    /// Asserts that both the counter and the histogram saw `kind` on `storage_type`.
    pub fn assert_operation(&self, kind: OperationKind, storage_type: StorageType, success: bool) {
        let points = self.points();
        for instrument in [OPERATION_COUNT_NAME, OPERATION_DURATION_NAME] {
            assert!(
                points
                    .iter()
                    .any(|point| point.instrument == instrument && point.describes(kind, storage_type, success)),
                "{instrument} has no point for {}/{} success={success}: {points:?}",
                kind.as_str(),
                storage_type.as_str(),
            );
        }
    }
}

fn points_of(metric: &Metric) -> Vec<ExportedPoint> {
    let attribute_sets: Vec<Vec<KeyValue>> = match metric.data() {
        AggregatedMetrics::U64(MetricData::Sum(sum)) => sum.data_points().map(|point| point.attributes().cloned().collect()).collect(),
        AggregatedMetrics::F64(MetricData::Histogram(histogram)) => histogram
            .data_points()
            .map(|point| point.attributes().cloned().collect())
            .collect(),
        _ => Vec::new(),
    };

    attribute_sets
        .into_iter()
        .map(|attributes| ExportedPoint {
            instrument: metric.name().to_string(),
            attributes,
        })
        .collect()
}

/// Captures formatted `tracing` output for asserting on storage events.
///
/// Install the subscriber with `set_default()` so only the current thread is captured.
/// Each event lands on its own line; string fields are rendered as `name="value"`.
#[derive(Debug, Clone, Default)]
pub(crate) struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    /// Returns the captured storage events, one formatted line each.
    pub fn events(&self) -> Vec<String> {
        self.output()
            .lines()
            .filter(|line| line.contains(attributes::STORAGE_EVENT_NAME))
            .map(str::to_string)
            .collect()
    }

    /// Asserts that an event for `activity` was emitted at the activity's level.
    pub fn assert_event(&self, activity: StorageActivity) {
        let tag = format!("{}=\"{}\"", attributes::STORAGE_ACTIVITY_NAME, activity.as_str());
        let level = activity.level();
        let events = self.events();
        assert!(
            events.iter().any(|line| line.contains(&tag) && line.contains(level.as_str())),
            "no {level} event with {tag}, got:\n{}",
            events.join("\n")
        );
    }

    /// Asserts that some event carries the string field `name` with `value`.
    pub fn assert_field(&self, name: &str, value: &str) {
        let field = format!("{name}=\"{value}\"");
        let events = self.events();
        assert!(
            events.iter().any(|line| line.contains(&field)),
            "no event with {field}, got:\n{}",
            events.join("\n")
        );
    }

    /// Asserts that no event carries the field `name`.
    pub fn assert_no_field(&self, name: &str) {
        let field = format!("{name}=");
        let events = self.events();
        assert!(
            events.iter().all(|line| !line.contains(&field)),
            "unexpected {name} field, got:\n{}",
            events.join("\n")
        );
    }

    /// Asserts that the raw output contains `expected` anywhere.
    pub fn assert_contains(&self, expected: &str) {
        let output = self.output();
        assert!(output.contains(expected), "log output does not contain '{expected}', got:\n{output}");
    }

    pub fn subscriber(&self) -> impl tracing::Subscriber {
        use tracing_subscriber::layer::SubscriberExt;
        tracing_subscriber::registry().with(tracing_subscriber::fmt::layer().with_writer(self.clone()).with_ansi(false))
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

pub(crate) struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
