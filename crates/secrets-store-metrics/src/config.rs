//! Metrics configuration loaded from the driver's environment.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;

/// Meter namespace shared by every driver metric.
pub const DEFAULT_NAMESPACE: &str = "secretsstore";

/// Default Prometheus listen address (the driver's `--metrics-addr` default).
pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:8095";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Meter namespace instruments are registered under
    pub namespace: String,
    /// When false every reporter is a no-op
    pub enabled: bool,
    /// Listen address for [`init_metrics_exporter`](crate::init_metrics_exporter)
    pub metrics_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            enabled: true,
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8095)),
        }
    }
}

impl MetricsConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if any variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    ///
    /// # Errors
    ///
    /// Returns error if any variable is set to an invalid value.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let namespace = match vars.get("METRICS_NAMESPACE") {
            Some(ns) if ns.trim().is_empty() => {
                return Err(invalid("METRICS_NAMESPACE", ns, "must not be empty"));
            }
            Some(ns) => ns.trim().to_string(),
            None => DEFAULT_NAMESPACE.to_string(),
        };

        let enabled = match vars.get("METRICS_ENABLED") {
            Some(value) => parse_bool("METRICS_ENABLED", value)?,
            None => true,
        };

        let addr = vars
            .get("METRICS_ADDR")
            .map(String::as_str)
            .unwrap_or(DEFAULT_METRICS_ADDR);
        let metrics_addr = addr
            .parse::<SocketAddr>()
            .map_err(|e| invalid("METRICS_ADDR", addr, &e.to_string()))?;

        Ok(MetricsConfig {
            namespace,
            enabled,
            metrics_addr,
        })
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(var, value, "expected true, false, 1 or 0")),
    }
}

fn invalid(var: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
