//! Instrument registry and the typed handles reporters record through.
//!
//! A registry is built once per reporter from a fixed catalog of
//! [`MetricDefinition`]s. Handles are owned by the reporter instance rather
//! than held in globals, so building a second reporter against a fresh
//! backend (as tests do) never re-registers anything behind the first one's
//! back.
//!
//! Recording through a handle never fails from the caller's point of view:
//! backend errors are logged and dropped.

use crate::attributes::{Attribute, AttributeKey, Tags};
use crate::backend::{CounterInstrument, HistogramInstrument, MeterProvider};
use crate::errors::InstrumentCreationError;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Integer-valued, monotonically increasing
    Counter,
    /// Float-valued distribution
    Histogram,
}

/// Static description of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: InstrumentKind,
    /// Attribute keys this metric may carry; anything else is dropped
    pub attributes: &'static [AttributeKey],
}

impl MetricDefinition {
    pub const fn counter(
        name: &'static str,
        description: &'static str,
        attributes: &'static [AttributeKey],
    ) -> Self {
        Self {
            name,
            description,
            kind: InstrumentKind::Counter,
            attributes,
        }
    }

    pub const fn histogram(
        name: &'static str,
        description: &'static str,
        attributes: &'static [AttributeKey],
    ) -> Self {
        Self {
            name,
            description,
            kind: InstrumentKind::Histogram,
            attributes,
        }
    }

    fn declares(&self, key: AttributeKey) -> bool {
        self.attributes.contains(&key)
    }

    /// Keep only declared attributes, preserving order.
    fn restrict(&self, attributes: Vec<Attribute>) -> Vec<Attribute> {
        let (kept, dropped): (Vec<_>, Vec<_>) =
            attributes.into_iter().partition(|a| self.declares(a.key));
        if !dropped.is_empty() {
            debug!(
                metric = %self.name,
                dropped = ?dropped.iter().map(|a| a.key.as_str()).collect::<Vec<_>>(),
                "Dropping undeclared attributes"
            );
        }
        kept
    }
}

enum Instrument {
    Counter(Arc<dyn CounterInstrument>),
    Histogram(Arc<dyn HistogramInstrument>),
}

/// Instruments registered for one catalog.
pub struct InstrumentRegistry {
    namespace: String,
    instruments: HashMap<&'static str, Instrument>,
}

impl std::fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("namespace", &self.namespace)
            .field("instruments", &self.instruments.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InstrumentRegistry {
    /// Register every definition with the meter for `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentCreationError::Rejected`] on the first definition
    /// the backend refuses. No registry is returned in that case.
    pub fn initialize(
        provider: &dyn MeterProvider,
        namespace: &str,
        definitions: &[MetricDefinition],
    ) -> Result<Self, InstrumentCreationError> {
        let meter = provider.meter(namespace);
        let mut instruments = HashMap::with_capacity(definitions.len());

        for definition in definitions {
            let rejected = |source| InstrumentCreationError::Rejected {
                name: definition.name.to_string(),
                source,
            };

            let instrument = match definition.kind {
                InstrumentKind::Counter => Instrument::Counter(
                    meter
                        .create_counter(definition.name, definition.description)
                        .map_err(rejected)?,
                ),
                InstrumentKind::Histogram => Instrument::Histogram(
                    meter
                        .create_histogram(definition.name, definition.description)
                        .map_err(rejected)?,
                ),
            };
            instruments.insert(definition.name, instrument);
        }

        Ok(Self {
            namespace: namespace.to_string(),
            instruments,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Typed handle for a registered counter.
    ///
    /// # Errors
    ///
    /// Returns error if `definition` was not part of the catalog or is not a counter.
    pub fn counter(
        &self,
        definition: &MetricDefinition,
    ) -> Result<EventCounter, InstrumentCreationError> {
        match self.instruments.get(definition.name) {
            Some(Instrument::Counter(inner)) if definition.kind == InstrumentKind::Counter => {
                Ok(EventCounter {
                    definition: *definition,
                    inner: Arc::clone(inner),
                })
            }
            Some(_) => Err(InstrumentCreationError::KindMismatch {
                name: definition.name.to_string(),
                expected: InstrumentKind::Counter,
            }),
            None => Err(InstrumentCreationError::NotRegistered(
                definition.name.to_string(),
            )),
        }
    }

    /// Typed handle for a registered histogram.
    ///
    /// # Errors
    ///
    /// Returns error if `definition` was not part of the catalog or is not a histogram.
    pub fn histogram(
        &self,
        definition: &MetricDefinition,
    ) -> Result<DurationHistogram, InstrumentCreationError> {
        match self.instruments.get(definition.name) {
            Some(Instrument::Histogram(inner)) if definition.kind == InstrumentKind::Histogram => {
                Ok(DurationHistogram {
                    definition: *definition,
                    inner: Arc::clone(inner),
                })
            }
            Some(_) => Err(InstrumentCreationError::KindMismatch {
                name: definition.name.to_string(),
                expected: InstrumentKind::Histogram,
            }),
            None => Err(InstrumentCreationError::NotRegistered(
                definition.name.to_string(),
            )),
        }
    }
}

/// Counter handle exposing the event/error/batch report operations.
#[derive(Clone)]
pub struct EventCounter {
    definition: MetricDefinition,
    inner: Arc<dyn CounterInstrument>,
}

impl EventCounter {
    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    /// Count one occurrence of the event.
    pub fn report_event(&self, tags: Tags) {
        self.add(1, tags);
    }

    /// Count one failure, tagged with `error_kind`.
    pub fn report_error(&self, error_kind: &str, tags: Tags) {
        self.add(1, tags.error_type(error_kind));
    }

    /// Add `count` occurrences at once (e.g. secrets synced in one batch).
    pub fn report_count(&self, count: u64, tags: Tags) {
        self.add(count, tags);
    }

    fn add(&self, delta: u64, tags: Tags) {
        let attributes = self.definition.restrict(tags.into_attributes());
        if let Err(e) = self.inner.add(delta, &attributes) {
            warn!(metric = %self.definition.name, error = %e, "Failed to record counter");
        }
    }
}

impl std::fmt::Debug for EventCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCounter")
            .field("metric", &self.definition.name)
            .finish()
    }
}

/// Histogram handle for operation durations, in seconds.
#[derive(Clone)]
pub struct DurationHistogram {
    definition: MetricDefinition,
    inner: Arc<dyn HistogramInstrument>,
}

impl DurationHistogram {
    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    /// Record the wall-clock time of a just-completed operation.
    pub fn report_duration(&self, elapsed: Duration) {
        let attributes = self.definition.restrict(Tags::new().into_attributes());
        if let Err(e) = self.inner.record(elapsed.as_secs_f64(), &attributes) {
            warn!(metric = %self.definition.name, error = %e, "Failed to record histogram");
        }
    }
}

impl std::fmt::Debug for DurationHistogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurationHistogram")
            .field("metric", &self.definition.name)
            .finish()
    }
}
