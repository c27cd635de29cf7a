//! Recording fake backend for tests.
//!
//! Available under `cfg(test)` and the `test-utils` feature. Every
//! registration and observation is kept in memory so tests can assert on
//! exactly what a reporter emitted. Instruments can be made to fail at
//! creation ([`RecordingMeterProvider::reject_instrument`]) or on every
//! recording ([`RecordingMeterProvider::fail_recordings`]).

use crate::attributes::Attribute;
use crate::backend::{CounterInstrument, HistogramInstrument, Meter, MeterProvider};
use crate::errors::BackendError;
use crate::registry::InstrumentKind;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub kind: InstrumentKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservedValue {
    Count(u64),
    Sample(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedObservation {
    pub namespace: String,
    pub name: String,
    pub value: ObservedValue,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Default)]
struct Recorded {
    registrations: Vec<Registration>,
    observations: Vec<RecordedObservation>,
}

#[derive(Debug, Default)]
struct Inner {
    recorded: Mutex<Recorded>,
    rejected: Mutex<HashSet<String>>,
    fail_recordings: AtomicBool,
    failed_recordings: AtomicUsize,
}

impl Inner {
    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn observe(
        &self,
        namespace: &str,
        name: &str,
        value: ObservedValue,
        attributes: &[Attribute],
    ) -> Result<(), BackendError> {
        if self.fail_recordings.load(Ordering::SeqCst) {
            self.failed_recordings.fetch_add(1, Ordering::SeqCst);
            return Err(BackendError::Unavailable(format!(
                "injected recording failure for '{name}'"
            )));
        }
        self.recorded().observations.push(RecordedObservation {
            namespace: namespace.to_string(),
            name: name.to_string(),
            value,
            attributes: attributes.to_vec(),
        });
        Ok(())
    }
}

/// In-memory [`MeterProvider`]. Clones share the same recorded state.
#[derive(Debug, Clone, Default)]
pub struct RecordingMeterProvider {
    inner: Arc<Inner>,
}

impl RecordingMeterProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject creation of the named instrument from now on.
    pub fn reject_instrument(&self, name: &str) {
        self.inner
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string());
    }

    /// Make every `add` / `record` return an error.
    pub fn fail_recordings(&self, fail: bool) {
        self.inner.fail_recordings.store(fail, Ordering::SeqCst);
    }

    /// Number of recording calls that were failed on purpose.
    pub fn failed_recordings(&self) -> usize {
        self.inner.failed_recordings.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.inner.recorded().registrations.clone()
    }

    pub fn observations(&self) -> Vec<RecordedObservation> {
        self.inner.recorded().observations.clone()
    }

    pub fn observations_for(&self, name: &str) -> Vec<RecordedObservation> {
        self.inner
            .recorded()
            .observations
            .iter()
            .filter(|o| o.name == name)
            .cloned()
            .collect()
    }

    /// Sum of every counter delta recorded for `name`.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.observations_for(name)
            .iter()
            .map(|o| match o.value {
                ObservedValue::Count(n) => n,
                ObservedValue::Sample(_) => 0,
            })
            .sum()
    }
}

impl MeterProvider for RecordingMeterProvider {
    fn meter(&self, namespace: &str) -> Arc<dyn Meter> {
        Arc::new(RecordingMeter {
            namespace: namespace.to_string(),
            inner: Arc::clone(&self.inner),
        })
    }
}

struct RecordingMeter {
    namespace: String,
    inner: Arc<Inner>,
}

impl RecordingMeter {
    fn register(
        &self,
        name: &str,
        description: &str,
        kind: InstrumentKind,
    ) -> Result<(), BackendError> {
        let rejected = self
            .inner
            .rejected
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name);
        if rejected {
            return Err(BackendError::Unavailable(format!(
                "instrument '{name}' rejected by test backend"
            )));
        }

        let mut recorded = self.inner.recorded();
        if recorded
            .registrations
            .iter()
            .any(|r| r.namespace == self.namespace && r.name == name)
        {
            return Err(BackendError::DuplicateInstrument {
                name: name.to_string(),
                namespace: self.namespace.clone(),
            });
        }
        recorded.registrations.push(Registration {
            namespace: self.namespace.clone(),
            name: name.to_string(),
            description: description.to_string(),
            kind,
        });
        Ok(())
    }

    fn handle(&self, name: &str) -> RecordingInstrument {
        RecordingInstrument {
            namespace: self.namespace.clone(),
            name: name.to_string(),
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Meter for RecordingMeter {
    fn create_counter(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<dyn CounterInstrument>, BackendError> {
        self.register(name, description, InstrumentKind::Counter)?;
        Ok(Arc::new(self.handle(name)))
    }

    fn create_histogram(
        &self,
        name: &str,
        description: &str,
    ) -> Result<Arc<dyn HistogramInstrument>, BackendError> {
        self.register(name, description, InstrumentKind::Histogram)?;
        Ok(Arc::new(self.handle(name)))
    }
}

struct RecordingInstrument {
    namespace: String,
    name: String,
    inner: Arc<Inner>,
}

impl CounterInstrument for RecordingInstrument {
    fn add(&self, delta: u64, attributes: &[Attribute]) -> Result<(), BackendError> {
        self.inner.observe(
            &self.namespace,
            &self.name,
            ObservedValue::Count(delta),
            attributes,
        )
    }
}

impl HistogramInstrument for RecordingInstrument {
    fn record(&self, value: f64, attributes: &[Attribute]) -> Result<(), BackendError> {
        self.inner.observe(
            &self.namespace,
            &self.name,
            ObservedValue::Sample(value),
            attributes,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_rejected_per_namespace() {
        let backend = RecordingMeterProvider::new();
        let meter = backend.meter("secretsstore");

        assert!(meter.create_counter("total_node_publish", "d").is_ok());
        assert!(matches!(
            meter.create_counter("total_node_publish", "d"),
            Err(BackendError::DuplicateInstrument { .. })
        ));
        // A different namespace is a different meter
        assert!(backend
            .meter("other")
            .create_counter("total_node_publish", "d")
            .is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let backend = RecordingMeterProvider::new();
        let clone = backend.clone();

        let counter = clone.meter("ns").create_counter("c", "d").unwrap();
        counter.add(2, &[]).unwrap();

        assert_eq!(backend.registrations().len(), 1);
        assert_eq!(backend.counter_total("c"), 2);
    }

    #[test]
    fn test_fail_recordings_toggle() {
        let backend = RecordingMeterProvider::new();
        let histogram = backend.meter("ns").create_histogram("h", "d").unwrap();

        backend.fail_recordings(true);
        assert!(histogram.record(1.0, &[]).is_err());
        backend.fail_recordings(false);
        assert!(histogram.record(2.0, &[]).is_ok());

        assert_eq!(backend.failed_recordings(), 1);
        assert_eq!(
            backend.observations_for("h").first().map(|o| o.value),
            Some(ObservedValue::Sample(2.0))
        );
    }
}
