//! Telemetry records and the delivery boundary
//!
//! Records are immutable once built. Delivery (batching, transport, retry)
//! belongs to whatever implements [`TelemetrySink`]; the engine only hands
//! records over and never observes a delivery failure.

pub mod sinks;

pub use sinks::{spawn_json_writer, ChannelSink, JsonLinesWriter, LogLinesSink, RecordingSink, TracingSink};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Emitted once when the engine starts
pub const GAME_LOADED: &str = "GameLoaded";
/// Page became hidden
pub const GAME_HIDDEN: &str = "GameHidden";
/// Page became visible
pub const GAME_VISIBLE: &str = "GameVisible";
/// Page is about to be discarded
pub const GAME_SESSION_ENDED: &str = "GameSessionEnded";
/// Player pressed the spin button
pub const SPIN_CLICKED: &str = "SpinClicked";
/// A new non-zero win amount appeared
pub const WIN_DETECTED: &str = "WinDetected";
/// Balance moved from one reading to another
pub const BALANCE_CHANGED: &str = "BalanceChanged";
/// Metric carrying the win amount
pub const WIN_AMOUNT_METRIC: &str = "WinAmount";

/// A single event property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Numeric reading
    Number(f64),
    /// Free text
    Text(String),
    /// Source missing or unreadable; serialized as null
    Absent,
}

impl PropertyValue {
    /// Numeric value, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<Option<f64>> for PropertyValue {
    fn from(value: Option<f64>) -> Self {
        value.map_or(PropertyValue::Absent, PropertyValue::Number)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

/// A named event with optional properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event name
    pub name: String,
    /// Event properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
    /// Wall-clock time of construction, milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl EventRecord {
    /// Create an event with no properties, stamped now
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            timestamp_ms: now_ms(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}

/// A named numeric measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    /// Metric name
    pub name: String,
    /// Measured value
    #[serde(rename = "average")]
    pub value: f64,
}

impl MetricRecord {
    /// Create a metric record
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Anything the engine hands to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Event(EventRecord),
    Metric(MetricRecord),
}

impl TelemetryRecord {
    /// Record name regardless of kind
    pub fn name(&self) -> &str {
        match self {
            TelemetryRecord::Event(event) => &event.name,
            TelemetryRecord::Metric(metric) => &metric.name,
        }
    }
}

impl From<EventRecord> for TelemetryRecord {
    fn from(event: EventRecord) -> Self {
        TelemetryRecord::Event(event)
    }
}

impl From<MetricRecord> for TelemetryRecord {
    fn from(metric: MetricRecord) -> Self {
        TelemetryRecord::Metric(metric)
    }
}

/// Delivery boundary for telemetry
///
/// Implementations must not panic on the caller's behalf; failures are
/// theirs to log and absorb.
pub trait TelemetrySink {
    /// Deliver an event
    fn track_event(&self, event: EventRecord);

    /// Deliver a metric
    fn track_metric(&self, metric: MetricRecord);

    /// Deliver either kind of record
    fn track(&self, record: TelemetryRecord) {
        match record {
            TelemetryRecord::Event(event) => self.track_event(event),
            TelemetryRecord::Metric(metric) => self.track_metric(metric),
        }
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for &S {
    fn track_event(&self, event: EventRecord) {
        (**self).track_event(event);
    }

    fn track_metric(&self, metric: MetricRecord) {
        (**self).track_metric(metric);
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Arc<S> {
    fn track_event(&self, event: EventRecord) {
        (**self).track_event(event);
    }

    fn track_metric(&self, metric: MetricRecord) {
        (**self).track_metric(metric);
    }
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn track_event(&self, event: EventRecord) {
        (**self).track_event(event);
    }

    fn track_metric(&self, metric: MetricRecord) {
        (**self).track_metric(metric);
    }
}

/// Fan out to two sinks
impl<A: TelemetrySink, B: TelemetrySink> TelemetrySink for (A, B) {
    fn track_event(&self, event: EventRecord) {
        self.0.track_event(event.clone());
        self.1.track_event(event);
    }

    fn track_metric(&self, metric: MetricRecord) {
        self.0.track_metric(metric.clone());
        self.1.track_metric(metric);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
