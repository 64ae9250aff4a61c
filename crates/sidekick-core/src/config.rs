//! Configuration types for sidekick
//!
//! The file is YAML. Metrics sections are typed here; every other top-level
//! section belongs to an output and is decoded by that output's crate through
//! [`SidekickConfig::output`].
//!
//! ```yaml
//! statsd:
//!   forwarder: "127.0.0.1:8125"
//! metrics:
//!   enabled: true
//! oci:
//!   region: ${OCI_REGION:-us-ashburn-1}
//!   objectstorage:
//!     bucket: falco-events
//! ```

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

use crate::error::{Result, SidekickError};

/// Pre-compiled regex for environment variable expansion
/// Pattern: ${VAR} or ${VAR:-default}
static ENV_VAR_REGEX: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::-([^}]*))?\}")
        .expect("env var regex pattern is invalid - this is a bug")
});

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, JsonSchema)]
pub struct SidekickConfig {
    /// Plain StatsD forwarding of output counters
    #[serde(default)]
    #[validate(nested)]
    pub statsd: StatsdConfig,

    /// DogStatsD forwarding of output counters (tags preserved)
    #[serde(default)]
    #[validate(nested)]
    pub dogstatsd: DogstatsdConfig,

    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Background count-metric queue
    #[serde(default)]
    #[validate(nested)]
    pub dispatcher: DispatcherConfig,

    /// Output sections keyed by output name (e.g. `oci`)
    #[serde(flatten)]
    #[schemars(skip)]
    pub outputs: BTreeMap<String, serde_yaml::Value>,
}

/// StatsD forwarder settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct StatsdConfig {
    /// `host:port` of the StatsD daemon; empty disables forwarding
    #[serde(default)]
    #[validate(custom(function = "validate_forwarder"))]
    pub forwarder: String,

    /// Prefix prepended to every metric name
    #[serde(default = "default_statsd_namespace")]
    pub namespace: String,
}

/// DogStatsD forwarder settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct DogstatsdConfig {
    /// `host:port` of the DogStatsD agent; empty disables forwarding
    #[serde(default)]
    #[validate(custom(function = "validate_forwarder"))]
    pub forwarder: String,

    /// Prefix prepended to every metric name
    #[serde(default = "default_statsd_namespace")]
    pub namespace: String,

    /// Tags appended to every metric
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct MetricsConfig {
    /// Serve `/metrics` over HTTP
    #[serde(default)]
    pub enabled: bool,

    /// Listen port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// Count-metric dispatcher settings
#[derive(Debug, Clone, Deserialize, Serialize, Validate, JsonSchema)]
pub struct DispatcherConfig {
    /// Capacity of the bounded queue; metrics beyond it are dropped
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub queue_capacity: usize,
}

fn default_statsd_namespace() -> String {
    "sidekick.".to_string()
}

fn default_metrics_port() -> u16 {
    2801
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for StatsdConfig {
    fn default() -> Self {
        Self {
            forwarder: String::new(),
            namespace: default_statsd_namespace(),
        }
    }
}

impl Default for DogstatsdConfig {
    fn default() -> Self {
        Self {
            forwarder: String::new(),
            namespace: default_statsd_namespace(),
            tags: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn validate_forwarder(forwarder: &str) -> std::result::Result<(), ValidationError> {
    let forwarder = forwarder.trim();
    if forwarder.is_empty() {
        return Ok(());
    }
    match forwarder.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ValidationError::new("forwarder_must_be_host_port")),
    }
}

impl SidekickConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SidekickError::config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding environment variables first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = Self::expand_env_vars(content);
        if expanded.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Expand environment variables in the format ${VAR} or ${VAR:-default}
    fn expand_env_vars(content: &str) -> String {
        ENV_VAR_REGEX
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default = caps.get(2).map(|m| m.as_str());

                std::env::var(var_name).unwrap_or_else(|_| default.unwrap_or("").to_string())
            })
            .to_string()
    }

    /// Decode the section of a named output, `None` when the section is absent
    pub fn output<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.outputs.get(name) {
            None | Some(serde_yaml::Value::Null) => Ok(None),
            Some(section) => serde_yaml::from_value(section.clone())
                .map(Some)
                .map_err(|e| SidekickError::output_config(name, e.to_string())),
        }
    }

    /// Names of configured output sections
    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Validate the metrics sections
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| SidekickError::config(format!("validation failed: {}", e)))
    }
}
