//! Metrics for the CSI node server and the Kubernetes secret sync.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `total_node_publish` | Counter | `provider`, `os_type` |
//! | `total_node_unpublish` | Counter | `os_type` |
//! | `total_node_publish_error` | Counter | `provider`, `error_type`, `os_type` |
//! | `total_node_unpublish_error` | Counter | `os_type` |
//! | `total_sync_k8s_secret` | Counter | `provider`, `os_type` |
//! | `sync_k8s_secret_duration_sec` | Histogram | `os_type` |
//!
//! Unpublish carries no `provider`: the volume is torn down without asking
//! the provider anything.

use crate::attributes::{AttributeKey, Tags};
use crate::backend::MeterProvider;
use crate::errors::InstrumentCreationError;
use crate::registry::{DurationHistogram, EventCounter, InstrumentRegistry, MetricDefinition};
use std::time::Duration;

pub const NODE_PUBLISH_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_node_publish",
    "Total number of node publish calls",
    &[AttributeKey::Provider, AttributeKey::OsType],
);

pub const NODE_UNPUBLISH_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_node_unpublish",
    "Total number of node unpublish calls",
    &[AttributeKey::OsType],
);

pub const NODE_PUBLISH_ERROR_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_node_publish_error",
    "Total number of node publish calls with error",
    &[
        AttributeKey::Provider,
        AttributeKey::ErrorType,
        AttributeKey::OsType,
    ],
);

pub const NODE_UNPUBLISH_ERROR_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_node_unpublish_error",
    "Total number of node unpublish calls with error",
    &[AttributeKey::OsType],
);

pub const SYNC_K8S_SECRET_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_sync_k8s_secret",
    "Total number of k8s secrets synced",
    &[AttributeKey::Provider, AttributeKey::OsType],
);

pub const SYNC_K8S_SECRET_DURATION: MetricDefinition = MetricDefinition::histogram(
    "sync_k8s_secret_duration_sec",
    "Distribution of how long it took to sync k8s secret",
    &[AttributeKey::OsType],
);

pub const SECRETS_STORE_METRICS: &[MetricDefinition] = &[
    NODE_PUBLISH_TOTAL,
    NODE_UNPUBLISH_TOTAL,
    NODE_PUBLISH_ERROR_TOTAL,
    NODE_UNPUBLISH_ERROR_TOTAL,
    SYNC_K8S_SECRET_TOTAL,
    SYNC_K8S_SECRET_DURATION,
];

/// What the node server and secret sync record.
pub trait SecretsStoreStatsReporter: Send + Sync {
    fn report_node_publish_ct_metric(&self, provider: &str);
    fn report_node_unpublish_ct_metric(&self);
    fn report_node_publish_error_ct_metric(&self, provider: &str, error_type: &str);
    fn report_node_unpublish_error_ct_metric(&self);
    /// `count` is the number of secrets synced in this pass.
    fn report_sync_k8s_secret_ct_metric(&self, provider: &str, count: u64);
    fn report_sync_k8s_secret_duration(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SecretsStoreReporter {
    node_publish_total: EventCounter,
    node_unpublish_total: EventCounter,
    node_publish_error_total: EventCounter,
    node_unpublish_error_total: EventCounter,
    sync_k8s_secret_total: EventCounter,
    sync_k8s_secret_duration: DurationHistogram,
}

impl SecretsStoreReporter {
    /// Register the node and sync instruments with `provider`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects any instrument.
    pub fn new(
        provider: &dyn MeterProvider,
        namespace: &str,
    ) -> Result<Self, InstrumentCreationError> {
        let registry = InstrumentRegistry::initialize(provider, namespace, SECRETS_STORE_METRICS)?;

        Ok(Self {
            node_publish_total: registry.counter(&NODE_PUBLISH_TOTAL)?,
            node_unpublish_total: registry.counter(&NODE_UNPUBLISH_TOTAL)?,
            node_publish_error_total: registry.counter(&NODE_PUBLISH_ERROR_TOTAL)?,
            node_unpublish_error_total: registry.counter(&NODE_UNPUBLISH_ERROR_TOTAL)?,
            sync_k8s_secret_total: registry.counter(&SYNC_K8S_SECRET_TOTAL)?,
            sync_k8s_secret_duration: registry.histogram(&SYNC_K8S_SECRET_DURATION)?,
        })
    }
}

impl SecretsStoreStatsReporter for SecretsStoreReporter {
    fn report_node_publish_ct_metric(&self, provider: &str) {
        self.node_publish_total.report_event(Tags::new().provider(provider));
    }

    fn report_node_unpublish_ct_metric(&self) {
        self.node_unpublish_total.report_event(Tags::new());
    }

    fn report_node_publish_error_ct_metric(&self, provider: &str, error_type: &str) {
        self.node_publish_error_total
            .report_error(error_type, Tags::new().provider(provider));
    }

    fn report_node_unpublish_error_ct_metric(&self) {
        self.node_unpublish_error_total.report_event(Tags::new());
    }

    fn report_sync_k8s_secret_ct_metric(&self, provider: &str, count: u64) {
        self.sync_k8s_secret_total
            .report_count(count, Tags::new().provider(provider));
    }

    fn report_sync_k8s_secret_duration(&self, duration: Duration) {
        self.sync_k8s_secret_duration.report_duration(duration);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSecretsStoreReporter;

impl SecretsStoreStatsReporter for NoopSecretsStoreReporter {
    fn report_node_publish_ct_metric(&self, _provider: &str) {}
    fn report_node_unpublish_ct_metric(&self) {}
    fn report_node_publish_error_ct_metric(&self, _provider: &str, _error_type: &str) {}
    fn report_node_unpublish_error_ct_metric(&self) {}
    fn report_sync_k8s_secret_ct_metric(&self, _provider: &str, _count: u64) {}
    fn report_sync_k8s_secret_duration(&self, _duration: Duration) {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::attributes::{runtime_os, Attribute};
    use crate::testing::{ObservedValue, RecordingMeterProvider};

    fn reporter() -> (RecordingMeterProvider, SecretsStoreReporter) {
        let backend = RecordingMeterProvider::new();
        let reporter =
            SecretsStoreReporter::new(&backend, "secretsstore").expect("reporter builds");
        (backend, reporter)
    }

    fn os_only() -> Vec<Attribute> {
        vec![Attribute::string(AttributeKey::OsType, runtime_os())]
    }

    #[test]
    fn test_registers_secrets_store_catalog() {
        let (backend, _reporter) = reporter();

        let names: Vec<_> = backend.registrations().into_iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "total_node_publish",
                "total_node_unpublish",
                "total_node_publish_error",
                "total_node_unpublish_error",
                "total_sync_k8s_secret",
                "sync_k8s_secret_duration_sec",
            ]
        );
    }

    #[test]
    fn test_report_node_publish_ct_metric() {
        let (backend, reporter) = reporter();

        reporter.report_node_publish_ct_metric("gcp");

        let observations = backend.observations_for("total_node_publish");
        assert_eq!(observations.len(), 1);
        assert_eq!(
            observations.first().unwrap().attributes,
            vec![
                Attribute::string(AttributeKey::Provider, "gcp"),
                Attribute::string(AttributeKey::OsType, runtime_os()),
            ]
        );
    }

    #[test]
    fn test_report_node_publish_error_ct_metric() {
        let (backend, reporter) = reporter();

        reporter.report_node_publish_error_ct_metric("azure", "AuthFailure");

        let observations = backend.observations_for("total_node_publish_error");
        assert_eq!(observations.len(), 1);
        let observation = observations.first().unwrap();
        assert_eq!(observation.value, ObservedValue::Count(1));
        assert_eq!(
            observation.attributes,
            vec![
                Attribute::string(AttributeKey::Provider, "azure"),
                Attribute::string(AttributeKey::ErrorType, "AuthFailure"),
                Attribute::string(AttributeKey::OsType, runtime_os()),
            ]
        );
    }

    #[test]
    fn test_empty_provider_and_error_type_recorded_as_unknown() {
        let (backend, reporter) = reporter();

        reporter.report_node_publish_error_ct_metric("", "");

        let observations = backend.observations_for("total_node_publish_error");
        assert_eq!(
            observations.first().unwrap().attributes,
            vec![
                Attribute::string(AttributeKey::Provider, "unknown"),
                Attribute::string(AttributeKey::ErrorType, "unknown"),
                Attribute::string(AttributeKey::OsType, runtime_os()),
            ]
        );
    }

    #[test]
    fn test_unpublish_metrics_only_carry_os_type() {
        let (backend, reporter) = reporter();

        reporter.report_node_unpublish_ct_metric();
        reporter.report_node_unpublish_error_ct_metric();

        for name in ["total_node_unpublish", "total_node_unpublish_error"] {
            let observations = backend.observations_for(name);
            assert_eq!(observations.len(), 1, "{name}");
            assert_eq!(observations.first().unwrap().attributes, os_only(), "{name}");
        }
    }

    #[test]
    fn test_report_sync_k8s_secret_ct_metric_adds_count() {
        let (backend, reporter) = reporter();

        reporter.report_sync_k8s_secret_ct_metric("vault", 5);

        let observations = backend.observations_for("total_sync_k8s_secret");
        assert_eq!(observations.len(), 1);
        assert_eq!(backend.counter_total("total_sync_k8s_secret"), 5);
        assert_eq!(
            observations.first().unwrap().attributes,
            vec![
                Attribute::string(AttributeKey::Provider, "vault"),
                Attribute::string(AttributeKey::OsType, runtime_os()),
            ]
        );
    }

    #[test]
    fn test_report_sync_k8s_secret_duration() {
        let (backend, reporter) = reporter();

        reporter.report_sync_k8s_secret_duration(Duration::from_secs(2));

        let observations = backend.observations_for("sync_k8s_secret_duration_sec");
        assert_eq!(observations.len(), 1);
        let observation = observations.first().unwrap();
        assert_eq!(observation.value, ObservedValue::Sample(2.0));
        assert_eq!(observation.attributes, os_only());
    }

    #[test]
    fn test_os_type_identical_across_all_observations() {
        let (backend, reporter) = reporter();

        reporter.report_node_publish_ct_metric("azure");
        reporter.report_node_unpublish_ct_metric();
        reporter.report_node_publish_error_ct_metric("azure", "x");
        reporter.report_node_unpublish_error_ct_metric();
        reporter.report_sync_k8s_secret_ct_metric("azure", 1);
        reporter.report_sync_k8s_secret_duration(Duration::from_millis(1));

        let observations = backend.observations();
        assert_eq!(observations.len(), 6);
        for observation in observations {
            let os_types: Vec<_> = observation
                .attributes
                .iter()
                .filter(|a| a.key == AttributeKey::OsType)
                .collect();
            assert_eq!(
                os_types,
                vec![&Attribute::string(AttributeKey::OsType, runtime_os())],
                "{}",
                observation.name
            );
        }
    }

    #[test]
    fn test_recording_failures_do_not_reach_caller() {
        let (backend, reporter) = reporter();
        backend.fail_recordings(true);

        reporter.report_node_publish_ct_metric("azure");
        reporter.report_node_publish_error_ct_metric("azure", "AuthFailure");
        reporter.report_sync_k8s_secret_ct_metric("azure", 3);
        reporter.report_sync_k8s_secret_duration(Duration::from_millis(10));

        assert_eq!(backend.failed_recordings(), 4);
        assert!(backend.observations().is_empty());
    }
}
