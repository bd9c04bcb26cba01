//! Telemetry sink for traces, exceptions and upstream dependency calls.
//!
//! The exporter core never talks to a logging backend directly. It writes to a
//! [`TelemetrySink`], which the binary wires to [`TracingSink`] and tests wire
//! to [`MemorySink`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Severity of a trace message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Verbose,
    Information,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Verbose => write!(f, "verbose"),
            Severity::Information => write!(f, "information"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One completed call to an upstream provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyCall {
    /// Dependency name (e.g. "NEST_API").
    pub name: String,
    /// What the call does.
    pub description: String,
    /// Wall-clock time the call started.
    pub start: DateTime<Utc>,
    /// Elapsed time until the call completed or failed.
    pub duration: Duration,
    /// Transport completed and the provider answered with a success status.
    pub success: bool,
}

impl DependencyCall {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        start: DateTime<Utc>,
        duration: Duration,
        success: bool,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            start,
            duration,
            success,
        }
    }
}

/// Side channel for diagnostics emitted by metric sources.
pub trait TelemetrySink: Send + Sync {
    /// Record a free-form trace message.
    fn record_trace(&self, message: &str, severity: Severity);

    /// Record an error caught at a component boundary.
    fn record_exception(&self, error: &(dyn std::error::Error + 'static));

    /// Record a finished upstream call.
    fn record_dependency_call(&self, call: &DependencyCall);
}

/// Shareable sink handle.
pub type SharedSink = Arc<dyn TelemetrySink>;

/// Sink that forwards everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    pub fn new() -> Self {
        Self
    }

    /// Convenience constructor returning a shared handle.
    pub fn shared() -> SharedSink {
        Arc::new(Self)
    }
}

impl TelemetrySink for TracingSink {
    fn record_trace(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Verbose => tracing::debug!(%severity, "{}", message),
            Severity::Information => tracing::info!(%severity, "{}", message),
            Severity::Warning => tracing::warn!(%severity, "{}", message),
            Severity::Error | Severity::Critical => tracing::error!(%severity, "{}", message),
        }
    }

    fn record_exception(&self, error: &(dyn std::error::Error + 'static)) {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }

        tracing::error!(error = %error, causes = ?chain, "Exception");
    }

    fn record_dependency_call(&self, call: &DependencyCall) {
        tracing::info!(
            dependency = %call.name,
            description = %call.description,
            start = %call.start.to_rfc3339(),
            duration_ms = call.duration.as_millis() as u64,
            success = call.success,
            "Dependency call"
        );
    }
}

/// Event captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Trace { message: String, severity: Severity },
    Exception { message: String },
    Dependency(DependencyCall),
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Recorded dependency calls, oldest first.
    pub fn dependency_calls(&self) -> Vec<DependencyCall> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Dependency(call) => Some(call.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded traces at or above `severity`.
    pub fn traces_at_least(&self, severity: Severity) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Trace {
                    message,
                    severity: s,
                } if *s >= severity => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Recorded exception messages.
    pub fn exceptions(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                TelemetryEvent::Exception { message } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TelemetrySink for MemorySink {
    fn record_trace(&self, message: &str, severity: Severity) {
        self.events.lock().push(TelemetryEvent::Trace {
            message: message.to_string(),
            severity,
        });
    }

    fn record_exception(&self, error: &(dyn std::error::Error + 'static)) {
        self.events.lock().push(TelemetryEvent::Exception {
            message: error.to_string(),
        });
    }

    fn record_dependency_call(&self, call: &DependencyCall) {
        self.events
            .lock()
            .push(TelemetryEvent::Dependency(call.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Outer(std::io::Error);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "outer failure")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Warning > Severity::Information);
        assert!(Severity::Information > Severity::Verbose);
    }

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        let call = DependencyCall::new(
            "NEST_API",
            "Get Json Thermostat data",
            Utc::now(),
            Duration::from_millis(120),
            true,
        );

        sink.record_trace("first", Severity::Verbose);
        sink.record_dependency_call(&call);
        sink.record_trace("second", Severity::Critical);

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], TelemetryEvent::Dependency(call.clone()));
        assert_eq!(sink.dependency_calls(), vec![call]);
        assert_eq!(sink.traces_at_least(Severity::Critical), vec!["second"]);
        assert_eq!(sink.traces_at_least(Severity::Verbose).len(), 2);
    }

    #[test]
    fn test_memory_sink_exceptions() {
        let sink = MemorySink::new();
        let err = Outer(std::io::Error::other("socket closed"));

        sink.record_exception(&err);

        assert_eq!(sink.exceptions(), vec!["outer failure"]);
        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_tracing_sink_does_not_panic_without_subscriber() {
        let sink = TracingSink::new();
        sink.record_trace("hello", Severity::Critical);
        sink.record_exception(&Outer(std::io::Error::other("boom")));
        sink.record_dependency_call(&DependencyCall::new(
            "OPENWEATHER_API",
            "Get Json weather",
            Utc::now(),
            Duration::from_secs(1),
            false,
        ));
    }

    #[test]
    fn test_dependency_call_serializes() {
        let call = DependencyCall::new(
            "NEST_API",
            "Get Json Thermostat data",
            Utc::now(),
            Duration::from_millis(5),
            false,
        );
        let json = serde_json::to_string(&call).unwrap();
        assert!(json.contains("\"name\":\"NEST_API\""));
        assert!(json.contains("\"success\":false"));
    }
}
