//! Startup wiring for the reporters.
//!
//! [`Reporters`] is the eager path: build both reporters in one call at
//! startup and hand the bundle to the node server, the rotation reconciler
//! and the secret sync. [`StatsReporters`] is the lazy path for components
//! that start in parallel: each reporter registers its instruments at most
//! once, however many of them ask for it at the same time.

use crate::backend::MeterProvider;
use crate::config::MetricsConfig;
use crate::errors::InstrumentCreationError;
use crate::rotation::{NoopRotationReporter, RotationReporter, RotationStatsReporter};
use crate::secrets_store::{
    NoopSecretsStoreReporter, SecretsStoreReporter, SecretsStoreStatsReporter,
};
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

/// Both reporters, ready for the call sites.
#[derive(Clone)]
pub struct Reporters {
    pub rotation: Arc<dyn RotationStatsReporter>,
    pub secrets_store: Arc<dyn SecretsStoreStatsReporter>,
}

impl std::fmt::Debug for Reporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporters").finish_non_exhaustive()
    }
}

impl Reporters {
    /// Register the full catalog under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns error on the first instrument the backend rejects. Startup
    /// should abort, or use [`Reporters::initialize_or_disabled`].
    pub fn initialize(
        provider: &dyn MeterProvider,
        namespace: &str,
    ) -> Result<Self, InstrumentCreationError> {
        let rotation = RotationReporter::new(provider, namespace)?;
        let secrets_store = SecretsStoreReporter::new(provider, namespace)?;
        info!(namespace = %namespace, "Metrics reporters initialized");
        Ok(Self {
            rotation: Arc::new(rotation),
            secrets_store: Arc::new(secrets_store),
        })
    }

    /// Like [`Reporters::initialize`], but never fails: returns no-op
    /// reporters when metrics are disabled or registration is rejected.
    pub fn initialize_or_disabled(provider: &dyn MeterProvider, config: &MetricsConfig) -> Self {
        if !config.enabled {
            info!("Metrics disabled, reporters will not record");
            return Self::disabled();
        }
        Self::initialize(provider, &config.namespace).unwrap_or_else(|e| {
            error!(error = %e, "Metrics unavailable, continuing without them");
            Self::disabled()
        })
    }

    /// Reporters that discard every observation.
    pub fn disabled() -> Self {
        Self {
            rotation: Arc::new(NoopRotationReporter),
            secrets_store: Arc::new(NoopSecretsStoreReporter),
        }
    }
}

/// Lazily-built reporter whose constructor runs exactly once.
///
/// Concurrent callers block until the first one finishes and then all see
/// the same instance, or the same error.
#[derive(Debug)]
pub struct ReporterCell<R> {
    cell: OnceLock<Result<Arc<R>, InstrumentCreationError>>,
}

impl<R> Default for ReporterCell<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ReporterCell<R> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Return the reporter, building it with `init` on first use.
    ///
    /// # Errors
    ///
    /// Returns the error from the first build. A failed build is remembered
    /// and `init` is never retried.
    pub fn get_or_initialize<F>(&self, init: F) -> Result<Arc<R>, InstrumentCreationError>
    where
        F: FnOnce() -> Result<R, InstrumentCreationError>,
    {
        self.cell.get_or_init(|| init().map(Arc::new)).clone()
    }

    /// The reporter, if it was built successfully.
    pub fn get(&self) -> Option<Arc<R>> {
        self.cell.get().and_then(|r| r.as_ref().ok()).cloned()
    }
}

/// Owns the backend and the once-built reporters for one process.
pub struct StatsReporters {
    provider: Arc<dyn MeterProvider>,
    namespace: String,
    enabled: bool,
    rotation: ReporterCell<RotationReporter>,
    secrets_store: ReporterCell<SecretsStoreReporter>,
}

impl std::fmt::Debug for StatsReporters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsReporters")
            .field("namespace", &self.namespace)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl StatsReporters {
    pub fn new(provider: Arc<dyn MeterProvider>, config: &MetricsConfig) -> Self {
        if !config.enabled {
            info!("Metrics disabled, reporters will not record");
        }
        Self {
            provider,
            namespace: config.namespace.clone(),
            enabled: config.enabled,
            rotation: ReporterCell::new(),
            secrets_store: ReporterCell::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Build every reporter now, failing on the first rejected instrument.
    ///
    /// # Errors
    ///
    /// Returns error if any instrument cannot be registered. Startup should
    /// abort, or call the `*_or_noop` accessors to run without metrics.
    pub fn initialize(&self) -> Result<(), InstrumentCreationError> {
        self.rotation()?;
        self.secrets_store()?;
        info!(namespace = %self.namespace, "Metrics reporters initialized");
        Ok(())
    }

    /// Rotation reporter. No-op when metrics are disabled.
    ///
    /// # Errors
    ///
    /// Returns error if the rotation instruments cannot be registered.
    pub fn rotation(&self) -> Result<Arc<dyn RotationStatsReporter>, InstrumentCreationError> {
        if !self.enabled {
            return Ok(Arc::new(NoopRotationReporter));
        }
        let reporter = self.rotation.get_or_initialize(|| {
            RotationReporter::new(self.provider.as_ref(), &self.namespace)
        })?;
        Ok(reporter)
    }

    /// Node publish / secret sync reporter. No-op when metrics are disabled.
    ///
    /// # Errors
    ///
    /// Returns error if the node or sync instruments cannot be registered.
    pub fn secrets_store(
        &self,
    ) -> Result<Arc<dyn SecretsStoreStatsReporter>, InstrumentCreationError> {
        if !self.enabled {
            return Ok(Arc::new(NoopSecretsStoreReporter));
        }
        let reporter = self.secrets_store.get_or_initialize(|| {
            SecretsStoreReporter::new(self.provider.as_ref(), &self.namespace)
        })?;
        Ok(reporter)
    }

    /// Rotation reporter, falling back to a no-op on registration failure.
    pub fn rotation_or_noop(&self) -> Arc<dyn RotationStatsReporter> {
        self.rotation().unwrap_or_else(|e| {
            error!(error = %e, "Rotation metrics unavailable, continuing without them");
            Arc::new(NoopRotationReporter)
        })
    }

    /// Secrets store reporter, falling back to a no-op on registration failure.
    pub fn secrets_store_or_noop(&self) -> Arc<dyn SecretsStoreStatsReporter> {
        self.secrets_store().unwrap_or_else(|e| {
            error!(error = %e, "Secrets store metrics unavailable, continuing without them");
            Arc::new(NoopSecretsStoreReporter)
        })
    }

    /// Snapshot of both reporters, with no-op fallbacks.
    pub fn reporters(&self) -> Reporters {
        Reporters {
            rotation: self.rotation_or_noop(),
            secrets_store: self.secrets_store_or_noop(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::testing::RecordingMeterProvider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn stats_reporters(backend: &RecordingMeterProvider, enabled: bool) -> StatsReporters {
        let config = MetricsConfig {
            enabled,
            ..MetricsConfig::default()
        };
        StatsReporters::new(Arc::new(backend.clone()), &config)
    }

    #[test]
    fn test_reporter_cell_runs_init_once() {
        let cell: ReporterCell<u32> = ReporterCell::new();
        let calls = AtomicUsize::new(0);

        let first = cell.get_or_initialize(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        let second = cell.get_or_initialize(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(8)
        });

        assert_eq!(*first.unwrap(), 7);
        assert_eq!(*second.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cell.get().as_deref(), Some(&7));
    }

    #[test]
    fn test_reporter_cell_remembers_failure() {
        let cell: ReporterCell<u32> = ReporterCell::new();
        let err = InstrumentCreationError::NotRegistered("x".to_string());

        assert_eq!(cell.get_or_initialize(|| Err(err.clone())), Err(err.clone()));
        assert_eq!(cell.get_or_initialize(|| Ok(1)), Err(err));
        assert!(cell.get().is_none());
    }

    #[test]
    fn test_initialize_registers_full_catalog_once() {
        let backend = RecordingMeterProvider::new();
        let reporters = stats_reporters(&backend, true);

        reporters.initialize().unwrap();
        reporters.initialize().unwrap();
        let _ = reporters.rotation().unwrap();
        let _ = reporters.secrets_store().unwrap();

        assert_eq!(backend.registrations().len(), 9);
    }

    #[test]
    fn test_concurrent_initialization_registers_exactly_once() {
        let backend = RecordingMeterProvider::new();
        let reporters = stats_reporters(&backend, true);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    let rotation = reporters.rotation().expect("no duplicate registration");
                    rotation.report_rotation_ct_metric("azure", false);
                    let store = reporters.secrets_store().expect("no duplicate registration");
                    store.report_node_publish_ct_metric("azure");
                });
            }
        });

        let mut names: Vec<_> = backend.registrations().into_iter().map(|r| r.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 9);
        assert_eq!(backend.registrations().len(), 9);
        assert_eq!(backend.counter_total("total_rotation_reconcile"), 16);
        assert_eq!(backend.counter_total("total_node_publish"), 16);
    }

    #[test]
    fn test_initialize_fails_when_instrument_rejected() {
        let backend = RecordingMeterProvider::new();
        backend.reject_instrument("total_node_unpublish");
        let reporters = stats_reporters(&backend, true);

        let err = reporters.initialize().unwrap_err();
        assert!(matches!(
            err,
            InstrumentCreationError::Rejected { ref name, .. } if name == "total_node_unpublish"
        ));
        assert!(reporters.secrets_store().is_err());
        // Rotation registered independently and still works
        assert!(reporters.rotation().is_ok());
    }

    #[test]
    fn test_or_noop_falls_back_and_keeps_running() {
        let backend = RecordingMeterProvider::new();
        backend.reject_instrument("total_rotation_reconcile");
        let reporters = stats_reporters(&backend, true);

        let rotation = reporters.rotation_or_noop();
        rotation.report_rotation_ct_metric("azure", true);
        rotation.report_rotation_duration(Duration::from_secs(1));

        assert!(backend.observations().is_empty());
    }

    #[test]
    fn test_disabled_metrics_never_touch_backend() {
        let backend = RecordingMeterProvider::new();
        let reporters = stats_reporters(&backend, false);

        reporters.initialize().unwrap();
        reporters
            .secrets_store_or_noop()
            .report_sync_k8s_secret_ct_metric("vault", 5);
        reporters
            .rotation_or_noop()
            .report_rotation_error_ct_metric("vault", "x", true);

        assert!(!reporters.is_enabled());
        assert!(backend.registrations().is_empty());
        assert!(backend.observations().is_empty());
    }

    #[test]
    fn test_reporters_initialize_registers_full_catalog() {
        let backend = RecordingMeterProvider::new();

        let reporters = Reporters::initialize(&backend, "secretsstore").unwrap();
        reporters.rotation.report_rotation_ct_metric("azure", true);
        reporters
            .secrets_store
            .report_node_publish_error_ct_metric("azure", "AuthFailure");

        assert_eq!(backend.registrations().len(), 9);
        assert!(backend
            .registrations()
            .iter()
            .all(|r| r.namespace == "secretsstore"));
        assert_eq!(backend.counter_total("total_rotation_reconcile"), 1);
        assert_eq!(backend.counter_total("total_node_publish_error"), 1);
    }

    #[test]
    fn test_reporters_initialize_propagates_rejection() {
        let backend = RecordingMeterProvider::new();
        backend.reject_instrument("sync_k8s_secret_duration_sec");

        let err = Reporters::initialize(&backend, "secretsstore").unwrap_err();
        assert!(matches!(
            err,
            InstrumentCreationError::Rejected { ref name, .. } if name == "sync_k8s_secret_duration_sec"
        ));
    }

    #[test]
    fn test_initialize_or_disabled_falls_back_on_rejection() {
        let backend = RecordingMeterProvider::new();
        backend.reject_instrument("total_node_publish");

        let reporters = Reporters::initialize_or_disabled(&backend, &MetricsConfig::default());
        reporters.rotation.report_rotation_ct_metric("azure", false);
        reporters.secrets_store.report_node_publish_ct_metric("azure");

        assert!(backend.observations().is_empty());
    }

    #[test]
    fn test_initialize_or_disabled_skips_backend_when_disabled() {
        let backend = RecordingMeterProvider::new();
        let config = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };

        let reporters = Reporters::initialize_or_disabled(&backend, &config);
        reporters.secrets_store.report_sync_k8s_secret_ct_metric("vault", 3);

        assert!(backend.registrations().is_empty());
        assert!(backend.observations().is_empty());
    }

    #[test]
    fn test_disabled_reporters_accept_every_call() {
        let reporters = Reporters::disabled();
        reporters.rotation.report_rotation_duration(Duration::from_secs(2));
        reporters.secrets_store.report_node_unpublish_ct_metric();
        reporters.secrets_store.report_node_unpublish_error_ct_metric();
    }

    #[test]
    fn test_stats_reporters_bundle_shares_registrations() {
        let backend = RecordingMeterProvider::new();
        let stats = stats_reporters(&backend, true);

        let first = stats.reporters();
        let second = stats.reporters();
        first.secrets_store.report_node_publish_ct_metric("gcp");
        second.secrets_store.report_node_publish_ct_metric("gcp");

        assert_eq!(backend.registrations().len(), 9);
        assert_eq!(backend.counter_total("total_node_publish"), 2);
    }
}
