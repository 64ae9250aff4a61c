//! Fire-and-forget count metrics
//!
//! Outputs call [`MetricDispatcher::count_metric`] on their hot path. The call
//! never blocks: the metric goes into a bounded queue drained by a background
//! task that forwards it to every configured [`CountSink`]. When the queue is
//! full or the worker is gone the metric is dropped with a warning.
//!
//! ```text
//! upload ──try_send──▶ [bounded queue] ──▶ worker ──▶ StatsdSink    (UDP)
//!                                                 └─▶ DogstatsdSink (UDP)
//! ```

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{DogstatsdConfig, StatsdConfig};
use crate::error::{Result, SidekickError};

/// One counter increment with its tags (`key:value`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountMetric {
    pub name: String,
    pub value: i64,
    pub tags: Vec<String>,
}

impl CountMetric {
    pub fn new(name: impl Into<String>, value: i64, tags: Vec<String>) -> Self {
        Self {
            name: name.into(),
            value,
            tags,
        }
    }
}

/// Destination of drained count metrics
#[async_trait]
pub trait CountSink: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Forward one metric
    async fn count(&self, metric: &CountMetric) -> std::io::Result<()>;
}

/// Cheap, cloneable handle used on the hot path
#[derive(Debug, Clone)]
pub struct MetricDispatcher {
    tx: mpsc::Sender<CountMetric>,
}

/// Owner of the background drain task
#[derive(Debug)]
pub struct DispatcherWorker {
    handle: JoinHandle<u64>,
}

impl DispatcherWorker {
    /// Wait until every handle is dropped and the queue is drained.
    ///
    /// Returns the number of metrics forwarded.
    pub async fn join(self) -> u64 {
        match self.handle.await {
            Ok(forwarded) => forwarded,
            Err(e) => {
                warn!("Count metric worker stopped abnormally: {}", e);
                0
            }
        }
    }
}

impl MetricDispatcher {
    /// Spawn the drain task on the current runtime.
    ///
    /// The worker exits once every `MetricDispatcher` clone is dropped and the
    /// queue is empty.
    pub fn spawn(capacity: usize, sinks: Vec<Arc<dyn CountSink>>) -> (Self, DispatcherWorker) {
        let (tx, mut rx) = mpsc::channel::<CountMetric>(capacity.max(1));

        let handle = tokio::spawn(async move {
            let mut forwarded = 0u64;
            while let Some(metric) = rx.recv().await {
                for sink in &sinks {
                    if let Err(e) = sink.count(&metric).await {
                        warn!(
                            sink = sink.name(),
                            metric = %metric.name,
                            "Failed to forward count metric: {}",
                            e
                        );
                    }
                }
                forwarded += 1;
            }
            debug!(forwarded, "Count metric worker finished");
            forwarded
        });

        (Self { tx }, DispatcherWorker { handle })
    }

    /// Queue a counter increment without waiting.
    ///
    /// Returns `false` when the metric was dropped.
    pub fn count_metric(&self, name: &str, value: i64, tags: &[String]) -> bool {
        match self
            .tx
            .try_send(CountMetric::new(name, value, tags.to_vec()))
        {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(metric)) => {
                warn!(metric = %metric.name, "Count metric queue full, dropping metric");
                false
            }
            Err(mpsc::error::TrySendError::Closed(metric)) => {
                warn!(metric = %metric.name, "Count metric worker closed, dropping metric");
                false
            }
        }
    }
}

/// Connected UDP socket shared by both statsd flavors
#[derive(Debug)]
struct UdpForwarder {
    socket: UdpSocket,
}

impl UdpForwarder {
    /// Resolve `host:port` and bind a local socket of the peer's family
    async fn connect(forwarder: &str) -> Result<Self> {
        let forwarder = forwarder.trim();
        let peer = lookup_host(forwarder)
            .await
            .map_err(|e| SidekickError::metrics(format!("cannot resolve {}: {}", forwarder, e)))?
            .next()
            .ok_or_else(|| SidekickError::metrics(format!("{} resolved to no address", forwarder)))?;

        let local = if peer.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| SidekickError::metrics(format!("bind {}: {}", local, e)))?;
        socket
            .connect(peer)
            .await
            .map_err(|e| SidekickError::metrics(format!("connect {}: {}", peer, e)))?;
        Ok(Self { socket })
    }

    async fn send(&self, line: &str) -> std::io::Result<()> {
        self.socket.send(line.as_bytes()).await.map(|_| ())
    }
}

/// Plain StatsD: tag values are folded into the metric name
#[derive(Debug)]
pub struct StatsdSink {
    namespace: String,
    udp: UdpForwarder,
}

impl StatsdSink {
    /// Connect to the configured forwarder
    pub async fn connect(config: &StatsdConfig) -> Result<Self> {
        Ok(Self {
            namespace: config.namespace.clone(),
            udp: UdpForwarder::connect(&config.forwarder).await?,
        })
    }

    /// `outputs` + `[output:oci, status:ok]` → `{ns}outputs.oci.ok:1|c`
    pub fn format_line(namespace: &str, metric: &CountMetric) -> String {
        let mut name = format!("{}{}", namespace, metric.name);
        for tag in &metric.tags {
            let value = tag.split_once(':').map(|(_, v)| v).unwrap_or(tag);
            name.push('.');
            name.push_str(value);
        }
        format!("{}:{}|c", name, metric.value)
    }
}

#[async_trait]
impl CountSink for StatsdSink {
    fn name(&self) -> &str {
        "statsd"
    }

    async fn count(&self, metric: &CountMetric) -> std::io::Result<()> {
        self.udp
            .send(&Self::format_line(&self.namespace, metric))
            .await
    }
}

/// DogStatsD: tags travel in the `#` section
#[derive(Debug)]
pub struct DogstatsdSink {
    namespace: String,
    global_tags: Vec<String>,
    udp: UdpForwarder,
}

impl DogstatsdSink {
    /// Connect to the configured forwarder
    pub async fn connect(config: &DogstatsdConfig) -> Result<Self> {
        Ok(Self {
            namespace: config.namespace.clone(),
            global_tags: config.tags.clone(),
            udp: UdpForwarder::connect(&config.forwarder).await?,
        })
    }

    /// `outputs` + `[output:oci, status:ok]` → `{ns}outputs:1|c|#output:oci,status:ok`
    pub fn format_line(namespace: &str, global_tags: &[String], metric: &CountMetric) -> String {
        let mut line = format!("{}{}:{}|c", namespace, metric.name, metric.value);
        let tags: Vec<&str> = metric
            .tags
            .iter()
            .chain(global_tags)
            .map(String::as_str)
            .collect();
        if !tags.is_empty() {
            line.push_str("|#");
            line.push_str(&tags.join(","));
        }
        line
    }
}

#[async_trait]
impl CountSink for DogstatsdSink {
    fn name(&self) -> &str {
        "dogstatsd"
    }

    async fn count(&self, metric: &CountMetric) -> std::io::Result<()> {
        self.udp
            .send(&Self::format_line(
                &self.namespace,
                &self.global_tags,
                metric,
            ))
            .await
    }
}

/// Build the sinks enabled in configuration, skipping ones that fail to connect
pub async fn sinks_from_config(
    statsd: &StatsdConfig,
    dogstatsd: &DogstatsdConfig,
) -> Vec<Arc<dyn CountSink>> {
    let mut sinks: Vec<Arc<dyn CountSink>> = Vec::new();

    if !statsd.forwarder.trim().is_empty() {
        match StatsdSink::connect(statsd).await {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!("StatsD forwarder {} unavailable: {}", statsd.forwarder, e),
        }
    }

    if !dogstatsd.forwarder.trim().is_empty() {
        match DogstatsdSink::connect(dogstatsd).await {
            Ok(sink) => sinks.push(Arc::new(sink)),
            Err(e) => warn!(
                "DogStatsD forwarder {} unavailable: {}",
                dogstatsd.forwarder, e
            ),
        }
    }

    sinks
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<CountMetric>>,
    }

    #[async_trait]
    impl CountSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn count(&self, metric: &CountMetric) -> std::io::Result<()> {
            self.seen.lock().push(metric.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl CountSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn count(&self, _metric: &CountMetric) -> std::io::Result<()> {
            Err(std::io::Error::other("agent down"))
        }
    }

    fn tags() -> Vec<String> {
        vec![
            "output:ociobjectstorage".to_string(),
            "status:ok".to_string(),
        ]
    }

    #[test]
    fn test_statsd_line_folds_tag_values() {
        let metric = CountMetric::new("outputs", 1, tags());
        assert_eq!(
            StatsdSink::format_line("sidekick.", &metric),
            "sidekick.outputs.ociobjectstorage.ok:1|c"
        );
    }

    #[test]
    fn test_dogstatsd_line_keeps_tags() {
        let metric = CountMetric::new("outputs", 1, tags());
        assert_eq!(
            DogstatsdSink::format_line("sidekick.", &["env:prod".to_string()], &metric),
            "sidekick.outputs:1|c|#output:ociobjectstorage,status:ok,env:prod"
        );
        let bare = CountMetric::new("outputs", 2, vec![]);
        assert_eq!(
            DogstatsdSink::format_line("", &[], &bare),
            "outputs:2|c"
        );
    }

    #[tokio::test]
    async fn test_dispatcher_forwards_to_all_sinks() {
        let recording = Arc::new(RecordingSink::default());
        let (dispatcher, worker) =
            MetricDispatcher::spawn(16, vec![Arc::new(FailingSink), recording.clone()]);

        assert!(dispatcher.count_metric("outputs", 1, &tags()));
        assert!(dispatcher.count_metric("outputs", 1, &tags()));
        drop(dispatcher);

        assert_eq!(worker.join().await, 2);
        let seen = recording.seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], CountMetric::new("outputs", 1, tags()));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_queue_drops_without_blocking() {
        let (dispatcher, worker) = MetricDispatcher::spawn(1, vec![]);

        // current_thread: the worker cannot run until we yield
        assert!(dispatcher.count_metric("outputs", 1, &tags()));
        assert!(!dispatcher.count_metric("outputs", 1, &tags()));

        drop(dispatcher);
        assert_eq!(worker.join().await, 1);
    }

    #[tokio::test]
    async fn test_statsd_sink_sends_udp() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = StatsdConfig {
            forwarder: receiver.local_addr().unwrap().to_string(),
            namespace: "sidekick.".to_string(),
        };
        let sink = StatsdSink::connect(&config).await.unwrap();
        sink.count(&CountMetric::new("outputs", 1, tags()))
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            "sidekick.outputs.ociobjectstorage.ok:1|c"
        );
    }

    #[tokio::test]
    async fn test_ipv6_forwarder_receives_metrics() {
        let receiver = match UdpSocket::bind("[::1]:0").await {
            Ok(socket) => socket,
            // host without IPv6 loopback
            Err(_) => return,
        };
        let statsd = StatsdConfig {
            forwarder: receiver.local_addr().unwrap().to_string(),
            namespace: "sidekick.".to_string(),
        };
        assert!(statsd.forwarder.starts_with("[::1]:"));

        let sinks = sinks_from_config(&statsd, &DogstatsdConfig::default()).await;
        assert_eq!(sinks.len(), 1);
        sinks[0]
            .count(&CountMetric::new("outputs", 1, tags()))
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(Duration::from_secs(5), receiver.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            std::str::from_utf8(&buf[..n]).unwrap(),
            "sidekick.outputs.ociobjectstorage.ok:1|c"
        );
    }

    #[tokio::test]
    async fn test_unresolvable_forwarder_is_metrics_error() {
        let config = StatsdConfig {
            forwarder: "localhost".to_string(),
            namespace: String::new(),
        };
        let err = StatsdSink::connect(&config).await.unwrap_err();
        assert!(matches!(err, SidekickError::Metrics(_)));
        assert!(!err.is_config());
    }

    #[tokio::test]
    async fn test_sinks_from_config_skips_disabled() {
        let sinks = sinks_from_config(&StatsdConfig::default(), &DogstatsdConfig::default()).await;
        assert!(sinks.is_empty());
    }
}
