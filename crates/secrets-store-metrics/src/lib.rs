//! Metrics reporting facade for the Secrets Store CSI driver.
//!
//! Call sites (node publish/unpublish handlers, the rotation reconciler and
//! the Kubernetes secret sync) record through narrow reporter traits and
//! never see the telemetry backend. Instruments are registered once at
//! startup; after that every `report_*` call is fire-and-forget.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Emitted by |
//! |--------|------|--------|------------|
//! | `total_rotation_reconcile` | Counter | `provider`, `os_type`, `rotated` | rotation reconciler |
//! | `total_rotation_reconcile_error` | Counter | `provider`, `error_type`, `os_type`, `rotated` | rotation reconciler |
//! | `rotation_reconcile_duration_sec` | Histogram | `os_type` | rotation reconciler |
//! | `total_node_publish` | Counter | `provider`, `os_type` | node publish |
//! | `total_node_unpublish` | Counter | `os_type` | node unpublish |
//! | `total_node_publish_error` | Counter | `provider`, `error_type`, `os_type` | node publish |
//! | `total_node_unpublish_error` | Counter | `os_type` | node unpublish |
//! | `total_sync_k8s_secret` | Counter | `provider`, `os_type` | secret sync |
//! | `sync_k8s_secret_duration_sec` | Histogram | `os_type` | secret sync |
//!
//! # Startup
//!
//! ```rust,ignore
//! let config = MetricsConfig::from_env()?;
//! let handle = init_metrics_recorder(&config)?;
//! // serve handle.render() on the driver's /metrics route
//!
//! let reporters = Reporters::initialize_or_disabled(&MetricsMeterProvider::new(), &config);
//! let node_metrics = Arc::clone(&reporters.secrets_store);
//! let rotation_metrics = Arc::clone(&reporters.rotation);
//! ```
//!
//! [`init_metrics_exporter`] installs the same recorder behind its own HTTP
//! listener on `metrics_addr` instead.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod attributes;
pub mod backend;
pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod registry;
pub mod rotation;
pub mod secrets_store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-exports for call sites
pub use attributes::{runtime_os, Attribute, AttributeKey, AttributeValue, Tags};
pub use backend::{
    init_metrics_exporter, init_metrics_recorder, MeterProvider, MetricsMeterProvider,
};
pub use bootstrap::{ReporterCell, Reporters, StatsReporters};
pub use config::MetricsConfig;
pub use errors::{BackendError, ConfigError, InstrumentCreationError, MetricsError};
pub use registry::{DurationHistogram, EventCounter, InstrumentRegistry, MetricDefinition};
pub use rotation::{NoopRotationReporter, RotationReporter, RotationStatsReporter};
pub use secrets_store::{
    NoopSecretsStoreReporter, SecretsStoreReporter, SecretsStoreStatsReporter,
};
