//! Aggregation of every configured source into one scrape body.

use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::source::{CachedSource, SourceStats};

/// Ordered set of cached sources answering a scrape.
#[derive(Debug)]
pub struct Aggregator {
    sources: Vec<CachedSource>,
}

/// Create a shareable aggregator handle.
pub type SharedAggregator = Arc<Aggregator>;

impl Aggregator {
    /// Create an aggregator. Output follows the order of `sources`.
    pub fn new(sources: Vec<CachedSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[CachedSource] {
        &self.sources
    }

    /// Collect every source and join the texts with `\n`.
    ///
    /// Sources are refreshed concurrently but always appear in configured
    /// order. A failed source contributes an empty segment; the scrape itself
    /// never fails.
    pub async fn collect(&self) -> String {
        let results = join_all(self.sources.iter().map(|source| source.collect())).await;

        let mut failed = 0usize;
        let segments: Vec<String> = results
            .into_iter()
            .map(|result| {
                result.unwrap_or_else(|_| {
                    failed += 1;
                    String::new()
                })
            })
            .collect();

        debug!(
            sources = self.sources.len(),
            failed, "Collected metrics from sources"
        );

        segments.join("\n")
    }

    /// Statistics for each source, in configured order.
    pub fn stats(&self) -> Vec<(String, SourceStats)> {
        self.sources
            .iter()
            .map(|s| (s.name().to_string(), s.stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MetricSource, SourceError};
    use async_trait::async_trait;
    use nestmon_common::MemorySink;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Source that sleeps before answering, to shuffle completion order.
    struct SlowSource {
        name: &'static str,
        body: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SlowSource {
        fn new(name: &'static str, body: Option<&'static str>, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                name,
                body,
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl MetricSource for SlowSource {
        fn name(&self) -> &str {
            self.name
        }

        fn dependency(&self) -> &str {
            "SLOW_API"
        }

        fn description(&self) -> &str {
            "Sleep then answer"
        }

        async fn fetch(&self) -> Result<String, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.body
                .map(str::to_string)
                .ok_or_else(|| SourceError::status("SLOW_API", 500, "down"))
        }

        fn render(&self, body: &str) -> Result<String, SourceError> {
            Ok(body.to_string())
        }
    }

    fn aggregator(sources: Vec<Arc<SlowSource>>, ttl: Duration) -> Aggregator {
        let sink = Arc::new(MemorySink::new());
        Aggregator::new(
            sources
                .into_iter()
                .map(|s| CachedSource::new(s, ttl, sink.clone()))
                .collect(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_is_configured_order() {
        let agg = aggregator(
            vec![
                SlowSource::new("first", Some("first 1"), 300),
                SlowSource::new("second", Some("second 2"), 10),
                SlowSource::new("third", Some("third 3"), 100),
            ],
            Duration::from_secs(60),
        );

        assert_eq!(agg.collect().await, "first 1\nsecond 2\nthird 3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_source_yields_empty_segment() {
        let agg = aggregator(
            vec![
                SlowSource::new("a", None, 10),
                SlowSource::new("b", Some("B_metric 2"), 10),
            ],
            Duration::from_secs(60),
        );

        assert_eq!(agg.collect().await, "\nB_metric 2");

        let stats = agg.stats();
        assert_eq!(stats[0].0, "a");
        assert_eq!(stats[0].1.failures, 1);
        assert_eq!(stats[1].1.failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_retried_next_scrape_only() {
        let a = SlowSource::new("a", None, 1);
        let agg = aggregator(vec![a.clone()], Duration::from_secs(60));

        assert_eq!(agg.collect().await, "");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);

        assert_eq!(agg.collect().await, "");
        assert_eq!(a.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_sources() {
        let agg = Aggregator::new(Vec::new());
        assert_eq!(agg.collect().await, "");
        assert!(agg.stats().is_empty());
    }
}
