//! sidekick-core - Shared plumbing for sidekick outputs
//!
//! This crate holds everything an output needs that is not specific to one
//! destination:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        sidekick-core                         │
//! │  FalcoPayload, SidekickConfig, SidekickError, Output trait   │
//! ├──────────────────────────────────────────────────────────────┤
//! │                      Metrics sinks                           │
//! │  ├── Statistics      (process-local counters per output)     │
//! │  ├── MetricDispatcher (async statsd / dogstatsd counts)      │
//! │  └── Metrics          (labeled registry, Prometheus facade)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Destination crates (e.g. `sidekick-storage`) implement [`Output`] and
//! report outcomes through an [`OutputReporter`].

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod output;
pub mod stats;
pub mod statsd;
pub mod types;

pub use config::{DispatcherConfig, DogstatsdConfig, MetricsConfig, SidekickConfig, StatsdConfig};
pub use error::{OutputStatus, Result, SidekickError};
pub use event::{FalcoPayload, Priority};
pub use crate::metrics::{Label, Metrics, MetricsCollector, MetricsSnapshot, NoopMetrics, PrometheusMetrics};
pub use output::{Output, OutputReporter};
pub use stats::Statistics;
pub use statsd::{CountMetric, CountSink, DispatcherWorker, MetricDispatcher};
pub use types::SensitiveString;
