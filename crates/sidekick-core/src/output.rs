//! Output trait and outcome reporting
//!
//! Every delivery ends in exactly one call to [`OutputReporter::record`],
//! which updates all three metrics sinks for that outcome:
//!
//! 1. the process-local [`Statistics`] bucket of the output
//! 2. the async `outputs` count metric (`output:<name>,status:<ok|error>`)
//! 3. the labeled `sidekick_outputs{destination,status}` counter

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::OutputStatus;
use crate::event::FalcoPayload;
use crate::metrics::{label_names, metric_names, Label, Metrics, NoopMetrics};
use crate::stats::Statistics;
use crate::statsd::MetricDispatcher;

/// Name of the count metric dispatched for every delivery
pub const OUTPUTS_COUNT_METRIC: &str = "outputs";

/// A destination that receives events.
///
/// Delivery is best effort: implementations report failures through logs and
/// metrics, never to the caller.
#[async_trait]
pub trait Output: Send + Sync {
    /// Destination name used in metrics (e.g. `ociobjectstorage`)
    fn destination(&self) -> &str;

    /// Deliver one event
    async fn send(&self, payload: &FalcoPayload);
}

/// Metrics sinks an output reports delivery outcomes to
#[derive(Clone)]
pub struct OutputReporter {
    destination: String,
    stats: Arc<Statistics>,
    metrics: Arc<dyn Metrics>,
    dispatcher: Option<MetricDispatcher>,
}

impl std::fmt::Debug for OutputReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputReporter")
            .field("destination", &self.destination)
            .field("dispatcher", &self.dispatcher.is_some())
            .finish_non_exhaustive()
    }
}

impl OutputReporter {
    /// Create a reporter and register the destination's counter bucket
    pub fn new(
        destination: impl Into<String>,
        stats: Arc<Statistics>,
        metrics: Arc<dyn Metrics>,
        dispatcher: Option<MetricDispatcher>,
    ) -> Self {
        let destination = destination.into();
        stats.register_output(&destination);
        Self {
            destination,
            stats,
            metrics,
            dispatcher,
        }
    }

    /// Reporter that only keeps process-local counters
    pub fn local(destination: impl Into<String>) -> Self {
        Self::new(
            destination,
            Arc::new(Statistics::new()),
            Arc::new(NoopMetrics),
            None,
        )
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }

    /// Tags of the `outputs` count metric for an outcome
    pub fn count_tags(&self, status: OutputStatus) -> Vec<String> {
        vec![
            format!("output:{}", self.destination),
            format!("status:{}", status),
        ]
    }

    /// Record one delivery outcome in every sink
    pub fn record(&self, status: OutputStatus) {
        self.stats.add(&self.destination, status.as_str(), 1);

        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.count_metric(OUTPUTS_COUNT_METRIC, 1, &self.count_tags(status));
        }

        self.metrics.increment_with_labels(
            metric_names::OUTPUTS,
            1,
            &[
                Label::new(label_names::DESTINATION, self.destination.as_str()),
                Label::new(label_names::STATUS, status.as_str()),
            ],
        );
    }
}
