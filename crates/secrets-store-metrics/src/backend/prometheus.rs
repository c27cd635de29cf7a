//! Production backend on top of the `metrics` facade.
//!
//! Instruments are described once at creation and emitted through the
//! `counter!` / `histogram!` macros on every observation, so they land in
//! whichever recorder is installed (the Prometheus exporter in the driver,
//! a `DebuggingRecorder` in tests).
//!
//! The exporter is flat: an instrument name may only be registered once per
//! provider, whatever namespace asks for it.

use super::{CounterInstrument, HistogramInstrument, Meter, MeterProvider};
use crate::attributes::Attribute;
use crate::config::MetricsConfig;
use crate::errors::{BackendError, MetricsError};
use metrics::{counter, describe_counter, describe_histogram, histogram, Label};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Buckets for every `*_duration_sec` histogram.
///
/// Rotation and secret sync both call out to the provider, so the range
/// spans fast cache hits up to slow vault round trips.
pub const DURATION_BUCKETS_SECONDS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
];

const DURATION_SUFFIX: &str = "_duration_sec";

/// Prometheus builder with the duration buckets applied.
///
/// # Errors
///
/// Returns error if the histogram bucket configuration is rejected.
pub fn build_prometheus_builder() -> Result<PrometheusBuilder, MetricsError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix(DURATION_SUFFIX.to_string()),
            DURATION_BUCKETS_SECONDS,
        )
        .map_err(|e| MetricsError::Recorder(format!("Failed to set duration buckets: {e}")))
}

/// Install the global Prometheus recorder and return its handle.
///
/// The host serves `handle.render()` on its own `/metrics` route. Must be
/// called before any reporter records, otherwise early observations go to
/// the no-op recorder.
///
/// # Errors
///
/// Returns error if a recorder is already installed.
pub fn init_metrics_recorder(config: &MetricsConfig) -> Result<PrometheusHandle, MetricsError> {
    let handle = build_prometheus_builder()?
        .install_recorder()
        .map_err(|e| {
            MetricsError::Recorder(format!("Failed to install Prometheus recorder: {e}"))
        })?;

    info!(namespace = %config.namespace, "Prometheus metrics recorder installed");
    Ok(handle)
}

/// Install the global Prometheus recorder behind its own HTTP listener on
/// `config.metrics_addr`.
///
/// # Errors
///
/// Returns error if a recorder is already installed or the listener
/// cannot be started.
pub fn init_metrics_exporter(config: &MetricsConfig) -> Result<(), MetricsError> {
    build_prometheus_builder()?
        .with_http_listener(config.metrics_addr)
        .install()
        .map_err(|e| {
            MetricsError::Recorder(format!("Failed to install Prometheus exporter: {e}"))
        })?;

    info!(
        addr = %config.metrics_addr,
        "Metrics exporter listening on http://{}/metrics",
        config.metrics_addr
    );
    Ok(())
}

/// [`MeterProvider`] backed by the process-wide `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct MetricsMeterProvider {
    // instrument name -> namespace that registered it
    registered: Arc<Mutex<HashMap<String, String>>>,
}

impl MetricsMeterProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MeterProvider for MetricsMeterProvider {
    fn meter(&self, namespace: &str) -> Arc<dyn Meter> {
        Arc::new(MetricsMeter {
            namespace: namespace.to_string(),
            registered: Arc::clone(&self.registered),
        })
    }
}

#[derive(Debug)]
struct MetricsMeter {
    namespace: String,
    registered: Arc<Mutex<HashMap<String, String>>>,
}

impl MetricsMeter {
    fn claim(&self, name: &str, description: &str) -> Result<(), BackendError> {
        if !is_valid_metric_name(name) {
            return Err(BackendError::InvalidName(name.to_string()));
        }
        if description.trim().is_empty() {
            return Err(BackendError::InvalidDescription(name.to_string()));
        }

        let mut registered = self
            .registered
            .lock()
            .map_err(|_| BackendError::Unavailable("instrument table lock poisoned".to_string()))?;

        if let Some(namespace) = registered.get(name) {
            return Err(BackendError::DuplicateInstrument {
                name: name.to_string(),
                namespace: namespace.clone(),
            });
        }
        registered.insert(name.to_string(), self.namespace.clone());

        debug!(metric = %name, namespace = %self.namespace, "Registered instrument");
        Ok(())
    }
}

impl Meter for MetricsMeter {
    fn create_counter(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<dyn CounterInstrument>, BackendError> {
        self.claim(name, description)?;
        describe_counter!(name.to_string(), description.to_string());
        Ok(Arc::new(MetricsCounter {
            name: name.to_string(),
        }))
    }

    fn create_histogram(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<dyn HistogramInstrument>, BackendError> {
        self.claim(name, description)?;
        describe_histogram!(name.to_string(), description.to_string());
        Ok(Arc::new(MetricsHistogram {
            name: name.to_string(),
        }))
    }
}

#[derive(Debug)]
struct MetricsCounter {
    name: String,
}

impl CounterInstrument for MetricsCounter {
    fn add(&self, delta: u64, attributes: &[Attribute]) -> Result<(), BackendError> {
        counter!(self.name.clone(), to_labels(attributes)).increment(delta);
        Ok(())
    }
}

#[derive(Debug)]
struct MetricsHistogram {
    name: String,
}

impl HistogramInstrument for MetricsHistogram {
    fn record(&self, value: f64, attributes: &[Attribute]) -> Result<(), BackendError> {
        histogram!(self.name.clone(), to_labels(attributes)).record(value);
        Ok(())
    }
}

fn to_labels(attributes: &[Attribute]) -> Vec<Label> {
    attributes
        .iter()
        .map(|a| Label::new(a.key.as_str(), a.value.to_string()))
        .collect()
}

/// Prometheus metric name rule: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
