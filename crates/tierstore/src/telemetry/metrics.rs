// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use opentelemetry::{
    InstrumentationScope, KeyValue,
    metrics::{Counter, Histogram, Meter, MeterProvider},
};

use crate::{OperationKind, StorageType, telemetry::attributes};

const METER_NAME: &str = "tierstore";
const VERSION: &str = "v0.1.0";
const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.47.0";
pub(crate) const OPERATION_COUNT_NAME: &str = "tierstore.operation.count";
pub(crate) const OPERATION_DURATION_NAME: &str = "tierstore.operation.duration";

pub(crate) fn create_meter(meter_provider: &dyn MeterProvider) -> Meter {
    meter_provider.meter_with_scope(
        InstrumentationScope::builder(METER_NAME)
            .with_version(VERSION)
            .with_schema_url(SCHEMA_URL)
            .build(),
    )
}

pub(crate) fn create_operation_counter(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter(OPERATION_COUNT_NAME)
        .with_description("Storage operations")
        .with_unit("{operation}")
        .build()
}

pub(crate) fn create_operation_duration_histogram(meter: &Meter) -> Histogram<f64> {
    meter
        .f64_histogram(OPERATION_DURATION_NAME)
        .with_description("Storage operation duration")
        .with_unit("s")
        .build()
}

/// OpenTelemetry instruments fed by the metrics service.
#[derive(Clone, Debug)]
pub(crate) struct OperationInstruments {
    count: Counter<u64>,
    duration: Histogram<f64>,
}

impl OperationInstruments {
    pub fn new(meter_provider: &dyn MeterProvider) -> Self {
        let meter = create_meter(meter_provider);
        Self {
            count: create_operation_counter(&meter),
            duration: create_operation_duration_histogram(&meter),
        }
    }

    pub fn record(&self, kind: OperationKind, storage_type: StorageType, success: bool, duration: Duration) {
        let attrs = [
            KeyValue::new(attributes::STORAGE_OPERATION_NAME, kind.as_str()),
            KeyValue::new(attributes::STORAGE_TIER_NAME, storage_type.as_str()),
            KeyValue::new(attributes::STORAGE_SUCCESS_NAME, success),
        ];

        self.count.add(1, &attrs);
        self.duration.record(duration.as_secs_f64(), &attrs);
    }
}
