//! In-Memory Monitor
//!
//! Retains spans, metric samples and log lines in process memory so they can
//! be inspected later. Used by tests and by hosts without an external sink.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::{LogLevel, Monitor, SpanId};

/// Default number of log lines kept before the oldest is dropped.
pub const DEFAULT_MAX_LOGS: usize = 1000;

// == Records ==
#[derive(Debug, Clone)]
pub struct SpanEventRecord {
    pub name: String,
    pub attributes: Value,
    pub at: Instant,
}

#[derive(Debug, Clone)]
pub struct SpanRecord {
    pub id: SpanId,
    pub name: String,
    /// Start attributes merged with the attributes given to `end_span`
    pub attributes: Value,
    pub events: Vec<SpanEventRecord>,
    pub started: Instant,
    /// Set once the span has ended
    pub duration: Option<Duration>,
}

impl SpanRecord {
    pub fn is_finished(&self) -> bool {
        self.duration.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub context: Value,
}

/// Aggregate over every sample recorded for one metric name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p95: f64,
}

impl MetricSummary {
    fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        let p95_index = ((count as f64 * 0.95) as usize).min(count - 1);

        Some(Self {
            count,
            sum,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p95: sorted[p95_index],
        })
    }
}

#[derive(Debug, Default)]
struct MonitorState {
    spans: HashMap<SpanId, SpanRecord>,
    metrics: HashMap<String, Vec<f64>>,
    logs: VecDeque<LogRecord>,
}

// == In-Memory Monitor ==
#[derive(Debug)]
pub struct InMemoryMonitor {
    state: Mutex<MonitorState>,
    max_logs: usize,
    sampling_rate: f64,
}

impl Default for InMemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMonitor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MonitorState::default()),
            max_logs: DEFAULT_MAX_LOGS,
            sampling_rate: 1.0,
        }
    }

    /// Caps the log buffer; the oldest line is dropped once it is full.
    pub fn with_max_logs(mut self, max_logs: usize) -> Self {
        self.max_logs = max_logs.max(1);
        self
    }

    /// Keeps only the given fraction of spans (clamped to 0.0..=1.0).
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = rate.clamp(0.0, 1.0);
        self
    }

    fn should_sample(&self) -> bool {
        self.sampling_rate >= 1.0 || rand::random::<f64>() < self.sampling_rate
    }

    // == Inspection ==
    pub fn span(&self, id: &SpanId) -> Option<SpanRecord> {
        self.state.lock().spans.get(id).cloned()
    }

    /// All retained spans with the given name, oldest first.
    pub fn spans_named(&self, name: &str) -> Vec<SpanRecord> {
        let mut spans: Vec<SpanRecord> = self
            .state
            .lock()
            .spans
            .values()
            .filter(|span| span.name == name)
            .cloned()
            .collect();
        spans.sort_by_key(|span| span.started);
        spans
    }

    pub fn span_count(&self) -> usize {
        self.state.lock().spans.len()
    }

    pub fn metric(&self, name: &str) -> Option<MetricSummary> {
        let state = self.state.lock();
        state
            .metrics
            .get(name)
            .and_then(|samples| MetricSummary::from_samples(samples))
    }

    /// Sum of all samples for a metric, 0.0 if never recorded.
    pub fn metric_sum(&self, name: &str) -> f64 {
        self.metric(name).map(|m| m.sum).unwrap_or(0.0)
    }

    /// Summaries for every metric recorded so far.
    pub fn export_metrics(&self) -> HashMap<String, MetricSummary> {
        let state = self.state.lock();
        state
            .metrics
            .iter()
            .filter_map(|(name, samples)| {
                MetricSummary::from_samples(samples).map(|summary| (name.clone(), summary))
            })
            .collect()
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.state.lock().logs.iter().cloned().collect()
    }

    pub fn logs_at(&self, level: LogLevel) -> Vec<LogRecord> {
        self.state
            .lock()
            .logs
            .iter()
            .filter(|record| record.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.spans.clear();
        state.metrics.clear();
        state.logs.clear();
    }
}

/// Shallow-merges the keys of `extra` into `base` when both are objects.
fn merge_attributes(base: &mut Value, extra: Value) {
    match (base, extra) {
        (Value::Object(base), Value::Object(extra)) => base.extend(extra),
        (base @ Value::Null, extra) => *base = extra,
        _ => {}
    }
}

impl Monitor for InMemoryMonitor {
    fn start_span(&self, name: &str, attrs: Value) -> SpanId {
        if !self.should_sample() {
            return SpanId::unsampled();
        }

        let id = SpanId::new(Uuid::new_v4().to_string());
        let record = SpanRecord {
            id: id.clone(),
            name: name.to_string(),
            attributes: attrs,
            events: Vec::new(),
            started: Instant::now(),
            duration: None,
        };
        self.state.lock().spans.insert(id.clone(), record);
        id
    }

    fn end_span(&self, span: &SpanId, attrs: Value) {
        let mut state = self.state.lock();
        if let Some(record) = state.spans.get_mut(span) {
            record.duration = Some(record.started.elapsed());
            merge_attributes(&mut record.attributes, attrs);
        }
    }

    fn add_event(&self, span: &SpanId, name: &str, attrs: Value) {
        let mut state = self.state.lock();
        if let Some(record) = state.spans.get_mut(span) {
            record.events.push(SpanEventRecord {
                name: name.to_string(),
                attributes: attrs,
                at: Instant::now(),
            });
        }
    }

    fn record(&self, metric: &str, value: f64) {
        self.state
            .lock()
            .metrics
            .entry(metric.to_string())
            .or_default()
            .push(value);
    }

    fn log(&self, level: LogLevel, message: &str, context: Value) {
        let mut state = self.state.lock();
        state.logs.push_back(LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            context,
        });
        while state.logs.len() > self.max_logs {
            state.logs.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_span_lifecycle() {
        let monitor = InMemoryMonitor::new();
        let span = monitor.start_span("cache.get", json!({ "key": "k" }));
        monitor.add_event(&span, "cache.hit", json!({ "key": "k" }));
        monitor.end_span(&span, json!({ "hit": true }));

        let record = monitor.span(&span).unwrap();
        assert!(record.is_finished());
        assert_eq!(record.events.len(), 1);
        assert_eq!(record.attributes["key"], "k");
        assert_eq!(record.attributes["hit"], true);
    }

    #[test]
    fn test_metric_summary() {
        let monitor = InMemoryMonitor::new();
        for value in 1..=20 {
            monitor.record("latency", value as f64);
        }

        let summary = monitor.metric("latency").unwrap();
        assert_eq!(summary.count, 20);
        assert_eq!(summary.sum, 210.0);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.max, 20.0);
        assert_eq!(summary.avg, 10.5);
        assert_eq!(summary.p95, 20.0);
        assert!(monitor.metric("unknown").is_none());
        assert_eq!(monitor.metric_sum("unknown"), 0.0);
    }

    #[test]
    fn test_log_ring_drops_oldest() {
        let monitor = InMemoryMonitor::new().with_max_logs(2);
        monitor.info("first", json!({}));
        monitor.info("second", json!({}));
        monitor.error("third", json!({}));

        let logs = monitor.logs();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].message, "second");
        assert_eq!(monitor.logs_at(LogLevel::Error).len(), 1);
    }

    #[test]
    fn test_zero_sampling_drops_spans() {
        let monitor = InMemoryMonitor::new().with_sampling_rate(0.0);
        let span = monitor.start_span("ignored", json!({}));
        monitor.add_event(&span, "event", json!({}));
        monitor.end_span(&span, json!({}));

        assert!(!span.is_sampled());
        assert_eq!(monitor.span_count(), 0);
    }

    #[test]
    fn test_clear() {
        let monitor = InMemoryMonitor::new();
        monitor.start_span("a", json!({}));
        monitor.record("m", 1.0);
        monitor.debug("line", json!({}));
        monitor.clear();

        assert_eq!(monitor.span_count(), 0);
        assert!(monitor.export_metrics().is_empty());
        assert!(monitor.logs().is_empty());
    }
}
