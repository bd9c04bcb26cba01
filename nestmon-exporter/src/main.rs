//! Prometheus exporter for Nest thermostat and OpenWeather telemetry.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use nestmon_common::{TracingSink, init_tracing};
use nestmon_exporter::{Aggregator, ExporterConfig, HttpServer, build_sources};

/// Prometheus exporter for Nest thermostat and OpenWeather telemetry.
#[derive(Parser, Debug)]
#[command(name = "nestmon-exporter")]
#[command(about = "Export Nest thermostat and OpenWeather readings as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "config.json5")]
    config: String,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (overrides config).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; without a file, everything comes from NESTMON_* variables
    let mut config = if Path::new(&args.config).exists() {
        ExporterConfig::load_from_file(&args.config)?
    } else {
        ExporterConfig::from_env()?
    };

    if let Some(listen) = args.listen {
        config.server.listen = listen
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {}: {}", listen, e))?;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting nestmon exporter"
    );

    let sink = TracingSink::shared();
    let sources = build_sources(&config, sink)?;
    for source in &sources {
        info!(source = %source.name(), ttl = ?source.ttl(), "Source configured");
    }

    let aggregator = Arc::new(Aggregator::new(sources));
    let http_server = HttpServer::new(
        aggregator.clone(),
        config.server.listen,
        config.server.max_concurrency,
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(shutdown_rx).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate() => {
            info!("Received SIGTERM, shutting down...");
        }
    }

    // Signal shutdown
    shutdown_tx.send(true)?;

    if tokio::time::timeout(Duration::from_secs(5), http_task)
        .await
        .is_err()
    {
        warn!("HTTP server did not stop within 5s");
    }

    // Print final stats
    for (name, stats) in aggregator.stats() {
        info!(
            source = %name,
            cache_hits = stats.cache_hits,
            upstream_calls = stats.upstream_calls,
            failures = stats.failures,
            "Final statistics"
        );
    }

    info!("Exporter stopped");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
