//! Labeled metrics registry
//!
//! Outputs report through the [`Metrics`] trait so the backend can be swapped:
//!
//! - [`PrometheusMetrics`] forwards to the `metrics` facade; with the
//!   `prometheus` feature [`init_metrics`] serves them at `/metrics`.
//! - [`MetricsCollector`] keeps everything in memory (tests, CLI summaries).
//! - [`NoopMetrics`] discards everything.
//!
//! # Example
//!
//! ```rust
//! use sidekick_core::metrics::{Label, Metrics, MetricsCollector};
//!
//! let collector = MetricsCollector::new();
//! let labels = [Label::new("destination", "ociobjectstorage"), Label::new("status", "ok")];
//! collector.increment_with_labels("sidekick_outputs", 1, &labels);
//!
//! let snapshot = collector.snapshot();
//! assert_eq!(snapshot.counter_with_labels("sidekick_outputs", &labels), Some(1));
//! ```

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A metric label pair
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct Label {
    /// Label name
    pub name: String,
    /// Label value
    pub value: String,
}

impl Label {
    /// Create a new label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Trait for labeled counter registries
pub trait Metrics: Send + Sync {
    /// Increment a counter by the given value
    fn increment(&self, name: &str, value: u64);

    /// Increment a counter with labels
    fn increment_with_labels(&self, name: &str, value: u64, labels: &[Label]);

    /// Get all current counters (backends that cannot read back return an empty snapshot)
    fn snapshot(&self) -> MetricsSnapshot;
}

/// A snapshot of counters keyed by `name{label=value,...}`
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Counter values keyed by name and labels
    pub counters: HashMap<String, u64>,
}

impl MetricsSnapshot {
    /// Get a counter value
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    /// Get a counter value by name and labels
    pub fn counter_with_labels(&self, name: &str, labels: &[Label]) -> Option<u64> {
        self.counter(&key_with_labels(name, labels))
    }
}

fn key_with_labels(name: &str, labels: &[Label]) -> String {
    if labels.is_empty() {
        name.to_string()
    } else {
        let label_str: Vec<_> = labels
            .iter()
            .map(|l| format!("{}={}", l.name, l.value))
            .collect();
        format!("{}{{{}}}", name, label_str.join(","))
    }
}

/// Simple in-memory metrics collector
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<HashMap<String, AtomicU64>>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared metrics collector
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Metrics for MetricsCollector {
    fn increment(&self, name: &str, value: u64) {
        let counters = self.counters.read();
        if let Some(counter) = counters.get(name) {
            counter.fetch_add(value, Ordering::Relaxed);
        } else {
            drop(counters);
            let mut counters = self.counters.write();
            counters
                .entry(name.to_string())
                .or_insert_with(|| AtomicU64::new(0))
                .fetch_add(value, Ordering::Relaxed);
        }
    }

    fn increment_with_labels(&self, name: &str, value: u64, labels: &[Label]) {
        let key = key_with_labels(name, labels);
        self.increment(&key, value);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(name, counter)| (name.clone(), counter.load(Ordering::Relaxed)))
            .collect();
        MetricsSnapshot { counters }
    }
}

/// No-op metrics implementation
#[derive(Debug, Default)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn increment(&self, _name: &str, _value: u64) {}
    fn increment_with_labels(&self, _name: &str, _value: u64, _labels: &[Label]) {}

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}

/// Registry backed by the `metrics` facade.
///
/// Whatever recorder is installed globally receives the counters; without one
/// they are dropped by the facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl Metrics for PrometheusMetrics {
    fn increment(&self, name: &str, value: u64) {
        metrics::counter!(name.to_string()).increment(value);
    }

    fn increment_with_labels(&self, name: &str, value: u64, labels: &[Label]) {
        let labels: Vec<(String, String)> = labels
            .iter()
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect();
        metrics::counter!(name.to_string(), &labels).increment(value);
    }

    fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot::default()
    }
}

#[cfg(feature = "prometheus")]
static METRICS_INITIALIZED: std::sync::OnceLock<()> = std::sync::OnceLock::new();

/// Initialize the Prometheus metrics exporter
///
/// Starts an HTTP listener serving `/metrics`. Safe to call multiple times
/// (only initializes once). Must be called from within a Tokio runtime.
#[cfg(feature = "prometheus")]
pub fn init_metrics(addr: std::net::SocketAddr) {
    METRICS_INITIALIZED.get_or_init(|| {
        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                tracing::info!(
                    "Prometheus metrics server listening on http://{}/metrics",
                    addr
                );
            }
            Err(e) => {
                tracing::error!("Failed to start Prometheus exporter: {}", e);
            }
        }
    });
}

/// No-op initialization when the prometheus feature is disabled
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(addr: std::net::SocketAddr) {
    tracing::warn!(
        "Prometheus exporter not compiled in, ignoring metrics listener on {}",
        addr
    );
}

/// Standard metric names
pub mod metric_names {
    /// Deliveries per output, labeled by `destination` and `status`
    pub const OUTPUTS: &str = "sidekick_outputs";
}

/// Standard label names
pub mod label_names {
    /// Output the delivery went to
    pub const DESTINATION: &str = "destination";
    /// `ok` or `error`
    pub const STATUS: &str = "status";
}
