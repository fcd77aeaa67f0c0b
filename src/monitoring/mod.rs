//! Monitoring Module
//!
//! The narrow port through which the cache, executor and container report
//! spans, events, metrics and log lines. Every call is fire-and-forget: the
//! signatures cannot fail, so a monitoring backend never alters control flow.

mod memory;
mod tracing_monitor;

use std::fmt;

use serde::Serialize;
use serde_json::Value;

pub use memory::{InMemoryMonitor, LogRecord, MetricSummary, SpanRecord, SpanEventRecord};
pub use tracing_monitor::TracingMonitor;

// == Span Id ==
/// Identifier handed out by [`Monitor::start_span`].
///
/// An empty id means the span was not sampled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SpanId(String);

impl SpanId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id of a span that was dropped by sampling.
    pub fn unsampled() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_sampled(&self) -> bool {
        !self.0.is_empty()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Log Level ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

// == Monitor ==
/// Sink for span, event, metric and log signals.
///
/// Attribute and context arguments are JSON objects, usually built with
/// `serde_json::json!`.
pub trait Monitor: Send + Sync {
    fn start_span(&self, name: &str, attrs: Value) -> SpanId;

    fn end_span(&self, span: &SpanId, attrs: Value);

    fn add_event(&self, span: &SpanId, name: &str, attrs: Value);

    fn record(&self, metric: &str, value: f64);

    fn log(&self, level: LogLevel, message: &str, context: Value);

    fn debug(&self, message: &str, context: Value) {
        self.log(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: Value) {
        self.log(LogLevel::Info, message, context);
    }

    fn warn(&self, message: &str, context: Value) {
        self.log(LogLevel::Warn, message, context);
    }

    fn error(&self, message: &str, context: Value) {
        self.log(LogLevel::Error, message, context);
    }
}

// == Noop Monitor ==
/// Discards every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn start_span(&self, _name: &str, _attrs: Value) -> SpanId {
        SpanId::unsampled()
    }

    fn end_span(&self, _span: &SpanId, _attrs: Value) {}

    fn add_event(&self, _span: &SpanId, _name: &str, _attrs: Value) {}

    fn record(&self, _metric: &str, _value: f64) {}

    fn log(&self, _level: LogLevel, _message: &str, _context: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unsampled_span_id() {
        let span = SpanId::unsampled();
        assert!(!span.is_sampled());
        assert_eq!(span.as_str(), "");
    }

    #[test]
    fn test_noop_monitor_accepts_everything() {
        let monitor = NoopMonitor;
        let span = monitor.start_span("noop", json!({}));
        monitor.add_event(&span, "event", json!({ "k": 1 }));
        monitor.record("metric", 1.0);
        monitor.warn("ignored", json!({}));
        monitor.end_span(&span, json!({}));
        assert!(!span.is_sampled());
    }

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warn < LogLevel::Error);
    }
}
