//! The metric source contract and its cached wrapper.
//!
//! A [`MetricSource`] knows how to fetch one upstream provider and render the
//! answer as exposition text. [`CachedSource`] puts a source behind its own
//! [`TtlCache`], times every upstream call, and reports failures to the
//! telemetry sink instead of propagating them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use nestmon_common::{DependencyCall, Severity, SharedSink, TelemetrySink};
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::cache::TtlCache;

/// Errors produced while refreshing a source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request never produced a complete response.
    #[error("Call to {dependency} failed: {source}")]
    Transport {
        dependency: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a non-success status.
    #[error("Call to {dependency} failed with status {status}")]
    Status {
        dependency: String,
        status: u16,
        body: String,
    },

    /// The response body did not match the provider schema.
    #[error("Failed to decode {dependency} response: {source}")]
    Decode {
        dependency: String,
        #[source]
        source: serde_json::Error,
    },

    /// The refresh task panicked or was cancelled.
    #[error("Refresh of source {name} aborted: {message}")]
    Task { name: String, message: String },
}

impl SourceError {
    pub fn transport(dependency: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            dependency: dependency.into(),
            source,
        }
    }

    pub fn status(dependency: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            dependency: dependency.into(),
            status,
            body: body.into(),
        }
    }

    pub fn decode(dependency: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            dependency: dependency.into(),
            source,
        }
    }
}

/// One upstream telemetry provider.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Source name, also the cache key.
    fn name(&self) -> &str;

    /// Dependency name used when tracking upstream calls.
    fn dependency(&self) -> &str;

    /// Short description of the upstream call.
    fn description(&self) -> &str;

    /// Perform one network call and return the raw response body.
    ///
    /// Succeeds only when the transport completed and the provider answered
    /// with a success status.
    async fn fetch(&self) -> Result<String, SourceError>;

    /// Decode a response body and render it as exposition text.
    fn render(&self, body: &str) -> Result<String, SourceError>;
}

/// Per-source counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Scrapes answered from the cache.
    pub cache_hits: u64,
    /// Refresh attempts that went upstream.
    pub upstream_calls: u64,
    /// Refresh attempts that failed.
    pub failures: u64,
}

/// A source behind its own TTL cache.
pub struct CachedSource {
    source: Arc<dyn MetricSource>,
    cache: Arc<TtlCache>,
    ttl: Duration,
    sink: SharedSink,
    stats: RwLock<SourceStats>,
}

impl CachedSource {
    /// Wrap `source`, caching successful renders for `ttl`.
    pub fn new(source: Arc<dyn MetricSource>, ttl: Duration, sink: SharedSink) -> Self {
        let cache = Arc::new(TtlCache::new(source.name()));
        Self {
            source,
            cache,
            ttl,
            sink,
            stats: RwLock::new(SourceStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> SourceStats {
        self.stats.read().clone()
    }

    /// Forget the cached render so the next call goes upstream.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Return the source's metrics, from the cache when still valid.
    ///
    /// On a miss the source is fetched, rendered and stored on a separate
    /// task, so a panic inside a provider is contained here and a refresh that
    /// outlives its caller still fills the cache. Failures are reported to the
    /// sink, never cached, and never retried.
    pub async fn collect(&self) -> Result<String, SourceError> {
        if let Some(text) = self.cache.get() {
            self.stats.write().cache_hits += 1;
            trace!(source = %self.name(), "Serving cached metrics");
            return Ok(text);
        }

        self.stats.write().upstream_calls += 1;

        let task = tokio::spawn(refresh(
            self.source.clone(),
            self.cache.clone(),
            self.ttl,
            self.sink.clone(),
        ));
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                let err = SourceError::Task {
                    name: self.name().to_string(),
                    message: if e.is_panic() {
                        "panicked".to_string()
                    } else {
                        "cancelled".to_string()
                    },
                };
                self.sink.record_exception(&err);
                Err(err)
            }
        };

        if let Err(e) = &result {
            self.stats.write().failures += 1;
            warn!(source = %self.name(), error = %e, "Source refresh failed");
        }
        result
    }
}

impl std::fmt::Debug for CachedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedSource")
            .field("name", &self.name())
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Fetch, track, decode and render one source, storing the text on success.
async fn refresh(
    source: Arc<dyn MetricSource>,
    cache: Arc<TtlCache>,
    ttl: Duration,
    sink: SharedSink,
) -> Result<String, SourceError> {
    let start = Utc::now();
    let timer = Instant::now();
    let fetched = source.fetch().await;
    let elapsed = timer.elapsed();

    sink.record_dependency_call(&DependencyCall::new(
        source.dependency(),
        source.description(),
        start,
        elapsed,
        fetched.is_ok(),
    ));

    let body = match fetched {
        Ok(body) => body,
        Err(e) => {
            report_failure(sink.as_ref(), &e);
            return Err(e);
        }
    };

    match source.render(&body) {
        Ok(text) => {
            sink.record_trace(
                &format!("Received content: {}\nPrometheus metric: {}", body, text),
                Severity::Verbose,
            );
            cache.set(text.clone(), ttl);
            debug!(
                source = %source.name(),
                ttl = ?ttl,
                bytes = text.len(),
                "Refreshed metrics"
            );
            Ok(text)
        }
        Err(e) => {
            sink.record_exception(&e);
            Err(e)
        }
    }
}

fn report_failure(sink: &dyn TelemetrySink, error: &SourceError) {
    match error {
        SourceError::Status {
            dependency,
            status,
            body,
        } => sink.record_trace(
            &format!(
                "Call to {} failed. Status code: {}, Content: {}",
                dependency, status, body
            ),
            Severity::Critical,
        ),
        other => sink.record_exception(other),
    }
}
