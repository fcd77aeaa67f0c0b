//! Tracing-backed Monitor
//!
//! Forwards every monitoring signal to the `tracing` subscriber installed by
//! the host process.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::{LogLevel, Monitor, SpanId};

/// Default [`Monitor`] used by the binary.
///
/// Spans are tracked only long enough to report their duration on `end_span`.
#[derive(Debug, Default)]
pub struct TracingMonitor {
    open_spans: Mutex<HashMap<SpanId, (String, Instant)>>,
}

impl TracingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spans started but not yet ended.
    pub fn open_span_count(&self) -> usize {
        self.open_spans.lock().len()
    }
}

impl Monitor for TracingMonitor {
    fn start_span(&self, name: &str, attrs: Value) -> SpanId {
        let span = SpanId::new(Uuid::new_v4().to_string());
        trace!(span_id = %span, span = name, attrs = %attrs, "span started");
        self.open_spans
            .lock()
            .insert(span.clone(), (name.to_string(), Instant::now()));
        span
    }

    fn end_span(&self, span: &SpanId, attrs: Value) {
        if let Some((name, started)) = self.open_spans.lock().remove(span) {
            debug!(
                span_id = %span,
                span = %name,
                duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                attrs = %attrs,
                "span finished"
            );
        }
    }

    fn add_event(&self, span: &SpanId, name: &str, attrs: Value) {
        trace!(span_id = %span, event = name, attrs = %attrs, "span event");
    }

    fn record(&self, metric: &str, value: f64) {
        trace!(metric, value, "metric recorded");
    }

    fn log(&self, level: LogLevel, message: &str, context: Value) {
        match level {
            LogLevel::Debug => debug!(context = %context, "{}", message),
            LogLevel::Info => info!(context = %context, "{}", message),
            LogLevel::Warn => warn!(context = %context, "{}", message),
            LogLevel::Error => error!(context = %context, "{}", message),
        }
    }
}
