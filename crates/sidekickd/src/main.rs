//! sidekickd - archive security events to object storage
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────────┐     ┌────────────────┐
//! │ events       │────▶│ OCIObjectStorage     │────▶│ bucket         │
//! │ (file/stdin) │     │ output               │     │ {prefix}/{day}/│
//! └──────────────┘     └──────────┬───────────┘     └────────────────┘
//!                                 │ ok / error
//!                                 ▼
//!                     stats · statsd/dogstatsd · prometheus
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Upload JSON lines from a file
//! sidekickd -c sidekick.yaml upload events.jsonl
//!
//! # Upload from stdin
//! falco -o json_output=true | sidekickd -c sidekick.yaml upload
//!
//! # Validate configuration and key material
//! sidekickd -c sidekick.yaml validate
//!
//! # Print the configuration schema
//! sidekickd schema oci
//! ```

mod events;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use sidekick_core::metrics::init_metrics;
use sidekick_core::stats::{ERROR, OK, TOTAL};
use sidekick_core::statsd::sinks_from_config;
use sidekick_core::{
    MetricDispatcher, Metrics, MetricsCollector, Output, OutputReporter, PrometheusMetrics, SidekickConfig,
    Statistics,
};
use sidekick_storage::oci::{self, key_fingerprint, parse_private_key, OciOutputConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "sidekickd")]
#[command(version, about = "Archive security events to object storage")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "sidekick.yaml", env = "SIDEKICK_CONFIG")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload events (JSON lines, one document, or an array)
    Upload {
        /// Input file, stdin when omitted or `-`
        input: Option<PathBuf>,
        /// Uploads in flight at once
        #[arg(long, default_value_t = 8)]
        concurrency: usize,
    },
    /// Validate configuration and private key material
    Validate,
    /// Show the configuration schema
    Schema {
        /// Section (sidekick, oci)
        #[arg(default_value = "sidekick")]
        section: String,
        /// Output format (json, yaml)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Commands::Schema { section, format } = &cli.command {
        return show_schema(section, format);
    }

    let config = SidekickConfig::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Commands::Upload { input, concurrency } => upload(config, input, concurrency).await,
        Commands::Validate => validate_config(&config),
        Commands::Schema { .. } => Ok(()),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn upload(config: SidekickConfig, input: Option<PathBuf>, concurrency: usize) -> Result<()> {
    config.check()?;

    let raw = events::read_input(input.as_deref()).await?;
    let events = events::parse_events(&raw)?;
    if events.is_empty() {
        warn!("No events to upload");
        return Ok(());
    }

    let stats = Arc::new(Statistics::new());
    let metrics: Arc<dyn Metrics> = if config.metrics.enabled {
        init_metrics(SocketAddr::from(([0, 0, 0, 0], config.metrics.port)));
        Arc::new(PrometheusMetrics)
    } else {
        MetricsCollector::shared()
    };
    let sinks = sinks_from_config(&config.statsd, &config.dogstatsd).await;
    let (dispatcher, worker) = MetricDispatcher::spawn(config.dispatcher.queue_capacity, sinks);

    let outputs = sidekick_storage::outputs_from_config(&config, |name| {
        OutputReporter::new(name, stats.clone(), metrics.clone(), Some(dispatcher.clone()))
    })?;
    drop(dispatcher);
    if outputs.is_empty() {
        anyhow::bail!(
            "No output configured in {:?}; add an `{}` section",
            config.output_names().collect::<Vec<_>>(),
            oci::CONFIG_SECTION
        );
    }

    info!(
        events = events.len(),
        outputs = outputs.len(),
        "Uploading events"
    );

    futures::stream::iter(events.iter().flat_map(|event| outputs.iter().map(move |o| (o, event))))
        .for_each_concurrent(concurrency.max(1), |(output, event)| {
            let stats = stats.clone();
            async move {
                stats.add(output.destination(), TOTAL, 1);
                output.send(event).await;
            }
        })
        .await;

    drop(outputs);
    let forwarded = worker.join().await;

    let snapshot = stats.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    info!(forwarded, "Count metrics flushed");

    let failed: u64 = snapshot
        .values()
        .map(|counters| counters.get(ERROR).copied().unwrap_or(0))
        .sum();
    let stored: u64 = snapshot
        .values()
        .map(|counters| counters.get(OK).copied().unwrap_or(0))
        .sum();
    if failed > 0 {
        anyhow::bail!("{} of {} uploads failed", failed, failed + stored);
    }
    Ok(())
}

fn validate_config(config: &SidekickConfig) -> Result<()> {
    config.check()?;

    let Some(oci_config) = config.output::<OciOutputConfig>(oci::CONFIG_SECTION)? else {
        println!("✓ Configuration valid (no outputs configured)");
        return Ok(());
    };
    let oci_config = oci_config.normalized();
    oci_config.check()?;

    let pem = oci_config.private_key_pem()?;
    let key = parse_private_key(pem.expose_secret(), oci_config.passphrase())?;
    let fingerprint = key_fingerprint(&key)?;

    println!("✓ Configuration valid!\n");
    println!("OCI Object Storage:");
    println!("  Endpoint: {}", oci_config.endpoint());
    println!("  Namespace: {}", oci_config.objectstorage.namespace);
    println!("  Bucket: {}", oci_config.objectstorage.bucket);
    println!("  Prefix: {:?}", oci_config.objectstorage.objectnameprefix);
    println!("  Key id: {}", oci_config.key_id());
    if fingerprint.eq_ignore_ascii_case(&oci_config.fingerprint) {
        println!("  Key fingerprint: {} (matches)", fingerprint);
    } else {
        println!(
            "  Key fingerprint: {} (configured {}, mismatch)",
            fingerprint, oci_config.fingerprint
        );
    }
    println!();

    println!("Metrics:");
    println!(
        "  StatsD: {}",
        if config.statsd.forwarder.is_empty() {
            "disabled"
        } else {
            config.statsd.forwarder.as_str()
        }
    );
    println!(
        "  DogStatsD: {}",
        if config.dogstatsd.forwarder.is_empty() {
            "disabled"
        } else {
            config.dogstatsd.forwarder.as_str()
        }
    );
    println!(
        "  Prometheus: {}",
        if config.metrics.enabled {
            format!("port {}", config.metrics.port)
        } else {
            "disabled".to_string()
        }
    );

    Ok(())
}

fn show_schema(section: &str, format: &str) -> Result<()> {
    use schemars::schema_for;

    let schema = match section {
        "sidekick" => serde_json::to_value(schema_for!(SidekickConfig))?,
        "oci" => serde_json::to_value(schema_for!(OciOutputConfig))?,
        unknown => anyhow::bail!("Unknown section: '{}' (expected sidekick or oci)", unknown),
    };

    match format {
        "yaml" => println!("{}", serde_yaml::to_string(&schema)?),
        _ => println!("{}", serde_json::to_string_pretty(&schema)?),
    }

    Ok(())
}
