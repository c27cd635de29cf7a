//! Metrics for the secret rotation reconciler.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `total_rotation_reconcile` | Counter | `provider`, `os_type`, `rotated` |
//! | `total_rotation_reconcile_error` | Counter | `provider`, `error_type`, `os_type`, `rotated` |
//! | `rotation_reconcile_duration_sec` | Histogram | `os_type` |

use crate::attributes::{AttributeKey, Tags};
use crate::backend::MeterProvider;
use crate::errors::InstrumentCreationError;
use crate::registry::{DurationHistogram, EventCounter, InstrumentRegistry, MetricDefinition};
use std::time::Duration;

pub const ROTATION_RECONCILE_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_rotation_reconcile",
    "Total number of rotation reconciles",
    &[
        AttributeKey::Provider,
        AttributeKey::OsType,
        AttributeKey::Rotated,
    ],
);

pub const ROTATION_RECONCILE_ERROR_TOTAL: MetricDefinition = MetricDefinition::counter(
    "total_rotation_reconcile_error",
    "Total number of rotation reconciles with error",
    &[
        AttributeKey::Provider,
        AttributeKey::ErrorType,
        AttributeKey::OsType,
        AttributeKey::Rotated,
    ],
);

pub const ROTATION_RECONCILE_DURATION: MetricDefinition = MetricDefinition::histogram(
    "rotation_reconcile_duration_sec",
    "Distribution of how long it took to rotate secrets-store content for pods",
    &[AttributeKey::OsType],
);

pub const ROTATION_METRICS: &[MetricDefinition] = &[
    ROTATION_RECONCILE_TOTAL,
    ROTATION_RECONCILE_ERROR_TOTAL,
    ROTATION_RECONCILE_DURATION,
];

/// What the rotation reconciler records after each reconcile.
pub trait RotationStatsReporter: Send + Sync {
    fn report_rotation_ct_metric(&self, provider: &str, was_rotated: bool);
    fn report_rotation_error_ct_metric(&self, provider: &str, error_type: &str, was_rotated: bool);
    fn report_rotation_duration(&self, duration: Duration);
}

/// Reporter backed by registered instruments.
#[derive(Debug, Clone)]
pub struct RotationReporter {
    reconcile_total: EventCounter,
    reconcile_error_total: EventCounter,
    reconcile_duration: DurationHistogram,
}

impl RotationReporter {
    /// Register the rotation instruments with `provider`.
    ///
    /// # Errors
    ///
    /// Returns error if the backend rejects any rotation instrument.
    pub fn new(
        provider: &dyn MeterProvider,
        namespace: &str,
    ) -> Result<Self, InstrumentCreationError> {
        let registry = InstrumentRegistry::initialize(provider, namespace, ROTATION_METRICS)?;

        Ok(Self {
            reconcile_total: registry.counter(&ROTATION_RECONCILE_TOTAL)?,
            reconcile_error_total: registry.counter(&ROTATION_RECONCILE_ERROR_TOTAL)?,
            reconcile_duration: registry.histogram(&ROTATION_RECONCILE_DURATION)?,
        })
    }
}

impl RotationStatsReporter for RotationReporter {
    fn report_rotation_ct_metric(&self, provider: &str, was_rotated: bool) {
        self.reconcile_total
            .report_event(Tags::new().provider(provider).rotated(was_rotated));
    }

    fn report_rotation_error_ct_metric(
        &self,
        provider: &str,
        error_type: &str,
        was_rotated: bool,
    ) {
        self.reconcile_error_total.report_error(
            error_type,
            Tags::new().provider(provider).rotated(was_rotated),
        );
    }

    fn report_rotation_duration(&self, duration: Duration) {
        self.reconcile_duration.report_duration(duration);
    }
}

/// Used when metrics are disabled or failed to initialize.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRotationReporter;

impl RotationStatsReporter for NoopRotationReporter {
    fn report_rotation_ct_metric(&self, _provider: &str, _was_rotated: bool) {}

    fn report_rotation_error_ct_metric(
        &self,
        _provider: &str,
        _error_type: &str,
        _was_rotated: bool,
    ) {
    }

    fn report_rotation_duration(&self, _duration: Duration) {}
}
