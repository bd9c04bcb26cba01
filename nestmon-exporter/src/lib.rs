//! Prometheus exporter for Nest thermostat and OpenWeather telemetry.
//!
//! The exporter polls each configured provider, renders the answer as gauge
//! metrics and serves the combined text on a single HTTP endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Providers   │────>│ CachedSource │────>│  Aggregator  │────>│ HTTP Server  │
//! │ (Nest, OWM)  │     │ (TTL cache)  │     │ (fixed order)│     │ (bounded)    │
//! └──────────────┘     └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Each source owns a single-slot cache with its own time-to-live, so a scrape
//! only reaches a provider when that provider's cached render has expired. A
//! failing provider contributes an empty segment and never fails the scrape.
//!
//! # Usage
//!
//! ```bash
//! nestmon-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for the recognised keys.

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod exposition;
pub mod http;
pub mod providers;
pub mod source;

pub use aggregator::{Aggregator, SharedAggregator};
pub use cache::TtlCache;
pub use config::ExporterConfig;
pub use http::HttpServer;
pub use providers::{NestSource, OpenWeatherSource};
pub use source::{CachedSource, MetricSource, SourceError, SourceStats};

use std::sync::Arc;

use nestmon_common::SharedSink;

/// Build the configured sources in scrape order: Nest, then OpenWeather.
pub fn build_sources(
    config: &ExporterConfig,
    sink: SharedSink,
) -> reqwest::Result<Vec<CachedSource>> {
    let mut sources = Vec::new();

    if let Some(nest) = &config.nest {
        sources.push(CachedSource::new(
            Arc::new(NestSource::new(nest)?),
            nest.ttl,
            sink.clone(),
        ));
    }

    if let Some(weather) = &config.openweather {
        sources.push(CachedSource::new(
            Arc::new(OpenWeatherSource::new(weather)?),
            weather.ttl,
            sink.clone(),
        ));
    }

    Ok(sources)
}
