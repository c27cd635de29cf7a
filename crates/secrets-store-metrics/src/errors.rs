//! Error types for the metrics reporting facade.
//!
//! Only construction can fail. Once a reporter exists, every `report_*`
//! call is fire-and-forget and never yields one of these to the caller.

use crate::registry::InstrumentKind;
use thiserror::Error;

/// Errors reported by a telemetry backend.
///
/// Returned by [`Meter`](crate::backend::Meter) when creating instruments and
/// by instrument handles when recording. The facade swallows the latter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("Instrument '{name}' is already registered in namespace '{namespace}'")]
    DuplicateInstrument { name: String, namespace: String },

    #[error("Invalid instrument name '{0}'")]
    InvalidName(String),

    #[error("Instrument '{0}' has an empty description")]
    InvalidDescription(String),

    #[error("Metrics backend unavailable: {0}")]
    Unavailable(String),
}

/// Failure to build the instrument registry for a reporter.
///
/// Fatal to the reporter subsystem. Startup either aborts or falls back to
/// the no-op reporters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstrumentCreationError {
    #[error("Failed to register instrument '{name}': {source}")]
    Rejected {
        name: String,
        #[source]
        source: BackendError,
    },

    #[error("Instrument '{0}' was not registered")]
    NotRegistered(String),

    #[error("Instrument '{name}' is not a {expected:?}")]
    KindMismatch {
        name: String,
        expected: InstrumentKind,
    },
}

/// Invalid metrics configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },
}

/// Failures installing the Prometheus exporter.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Prometheus recorder error: {0}")]
    Recorder(String),
}
