//! Error types for sidekick-core
//!
//! Destination crates define their own error enums for provider failures;
//! this one covers configuration and the shared plumbing.

use std::fmt;
use thiserror::Error;

/// Result type alias for sidekick-core
pub type Result<T> = std::result::Result<T, SidekickError>;

/// Main error type for the shared plumbing
#[derive(Error, Debug)]
pub enum SidekickError {
    /// Configuration could not be read or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured output section could not be decoded
    #[error("Output '{name}' configuration error: {message}")]
    OutputConfig { name: String, message: String },

    /// Metrics forwarder could not be set up
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration text is not valid YAML
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SidekickError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Create an output configuration error
    pub fn output_config(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::OutputConfig {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Check if this is a configuration problem (as opposed to a runtime one)
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::OutputConfig { .. } | Self::Yaml(_)
        )
    }
}

/// Outcome class of a single delivery, used as the `status` label/tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStatus {
    /// Delivery succeeded
    Ok,
    /// Delivery failed
    Error,
}

impl OutputStatus {
    /// The label value used in every metrics sink
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => crate::stats::OK,
            Self::Error => crate::stats::ERROR,
        }
    }
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
