//! Telemetry backend boundary.
//!
//! The facade only talks to these traits. Production uses
//! [`MetricsMeterProvider`] (the `metrics` crate, exported via Prometheus);
//! tests use the recording fake in [`crate::testing`].
//!
//! All handles are `Send + Sync`: the node server and the rotation
//! reconciler record from many tasks at once without extra locking.

pub mod prometheus;

use crate::attributes::Attribute;
use crate::errors::BackendError;
use std::sync::Arc;

pub use prometheus::{
    build_prometheus_builder, init_metrics_exporter, init_metrics_recorder, MetricsMeterProvider,
};

/// Hands out meters scoped to a namespace.
pub trait MeterProvider: Send + Sync {
    fn meter(&self, namespace: &str) -> Arc<dyn Meter>;
}

/// Creates named instruments within one namespace.
pub trait Meter: Send + Sync {
    fn create_counter(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<dyn CounterInstrument>, BackendError>;

    fn create_histogram(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<dyn HistogramInstrument>, BackendError>;
}

/// Monotonic integer counter.
pub trait CounterInstrument: Send + Sync {
    fn add(&self, delta: u64, attributes: &[Attribute]) -> Result<(), BackendError>;
}

/// Float-valued distribution.
pub trait HistogramInstrument: Send + Sync {
    fn record(&self, value: f64, attributes: &[Attribute]) -> Result<(), BackendError>;
}
