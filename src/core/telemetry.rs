//! Pluggable telemetry sink.
//!
//! Subsystems report events as `{name, measurements, metadata}` triples and
//! stay independent of any particular observability library. The production
//! sink forwards to `tracing`; tests use [`MemorySink`] to assert on what
//! was emitted.

use parking_lot::Mutex;
use std::collections::HashMap;

/// A single telemetry event.
///
/// `name` is a hierarchical path such as `["assignment", "created"]` or
/// `["timeout_checker", "completed"]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Hierarchical event name.
    pub name: Vec<String>,
    /// Numeric measurements (counts, durations, scores).
    pub measurements: HashMap<String, f64>,
    /// Free-form string context (ids, outcomes).
    pub metadata: HashMap<String, String>,
}

impl TelemetryEvent {
    /// Build an event from name segments.
    pub fn new<S: Into<String>>(name: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into_iter().map(Into::into).collect(),
            measurements: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    /// Attach a measurement.
    pub fn measure(mut self, key: impl Into<String>, value: f64) -> Self {
        self.measurements.insert(key.into(), value);
        self
    }

    /// Attach metadata.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Dotted rendering of the event name.
    pub fn name_path(&self) -> String {
        self.name.join(".")
    }
}

/// Receiver of telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Deliver one event. Implementations must not block on I/O.
    fn emit(&self, event: TelemetryEvent);
}

/// Default sink: forwards events to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        tracing::debug!(
            event = %event.name_path(),
            measurements = ?event.measurements,
            metadata = ?event.metadata,
            "telemetry"
        );
    }
}

/// In-memory sink for assertions in tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Events whose dotted name equals `path`.
    pub fn events_named(&self, path: &str) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.name_path() == path)
            .cloned()
            .collect()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}
