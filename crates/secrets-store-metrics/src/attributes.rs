//! Attribute vocabulary shared by every metric.
//!
//! # Cardinality
//!
//! Attribute keys are a closed set so label cardinality stays bounded:
//! - `provider`: bounded by installed providers (azure, vault, gcp, aws, ...)
//! - `error_type`: bounded by provider error categories
//! - `os_type`: one value per process, taken from the host platform
//! - `rotated`: 2 values
//!
//! Callers cannot set `os_type`. It is appended by the instrument handle.

use std::fmt;

/// Recorded in place of an empty `provider` or `error_type`.
pub const UNKNOWN_LABEL_VALUE: &str = "unknown";

/// The fixed set of attribute keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKey {
    Provider,
    ErrorType,
    OsType,
    Rotated,
}

impl AttributeKey {
    /// Key as it appears on the exported metric.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKey::Provider => "provider",
            AttributeKey::ErrorType => "error_type",
            AttributeKey::OsType => "os_type",
            AttributeKey::Rotated => "rotated",
        }
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
        }
    }
}

/// A single key/value tag attached to an observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: AttributeKey,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn string(key: AttributeKey, value: impl Into<String>) -> Self {
        Self {
            key,
            value: AttributeValue::String(value.into()),
        }
    }

    pub fn bool(key: AttributeKey, value: bool) -> Self {
        Self {
            key,
            value: AttributeValue::Bool(value),
        }
    }
}

/// Host platform identifier used for every `os_type` attribute.
///
/// Matches the values the driver has always exported (`linux`, `windows`).
pub fn runtime_os() -> &'static str {
    std::env::consts::OS
}

/// Caller-supplied tags for an observation.
///
/// Only `provider` and `rotated` are settable from outside the crate;
/// `error_type` comes in through
/// [`EventCounter::report_error`](crate::registry::EventCounter::report_error).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tags {
    provider: Option<String>,
    error_type: Option<String>,
    rotated: Option<bool>,
}

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `provider` label. An empty string is recorded as
    /// [`UNKNOWN_LABEL_VALUE`] so the series never carries an empty label.
    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = Some(non_empty(provider));
        self
    }

    pub fn rotated(mut self, rotated: bool) -> Self {
        self.rotated = Some(rotated);
        self
    }

    // Empty values become UNKNOWN_LABEL_VALUE, as for provider
    pub(crate) fn error_type(mut self, error_type: &str) -> Self {
        self.error_type = Some(non_empty(error_type));
        self
    }

    /// Expands into attributes in export order, appending `os_type`.
    pub(crate) fn into_attributes(self) -> Vec<Attribute> {
        let mut attributes = Vec::with_capacity(4);
        if let Some(provider) = self.provider {
            attributes.push(Attribute::string(AttributeKey::Provider, provider));
        }
        if let Some(error_type) = self.error_type {
            attributes.push(Attribute::string(AttributeKey::ErrorType, error_type));
        }
        attributes.push(Attribute::string(AttributeKey::OsType, runtime_os()));
        if let Some(rotated) = self.rotated {
            attributes.push(Attribute::bool(AttributeKey::Rotated, rotated));
        }
        attributes
    }
}

fn non_empty(value: &str) -> String {
    if value.is_empty() {
        UNKNOWN_LABEL_VALUE.to_string()
    } else {
        value.to_string()
    }
}
