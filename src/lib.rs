//! slot-telemetry - Non-invasive telemetry for slot machine web UIs
//!
//! Observes a rendered game page through a read-only document capability,
//! turns on-screen text into numbers and emits one telemetry record per
//! real player action or state transition. Nothing in the host page is
//! modified.

pub mod config;
pub mod dom;
pub mod engine;
pub mod lifecycle;
pub mod parser;
pub mod readiness;
pub mod replay;
pub mod spin;
pub mod telemetry;
pub mod watcher;

pub use config::{SelectorKey, SelectorTable, TelemetryConfig};
pub use dom::{Document, NodeId, Selector, SubscriptionId, VirtualDocument};
pub use engine::{start_when_ready, EngineStatus, PageSignal, TelemetryEngine};
pub use lifecycle::VisibilityState;
pub use readiness::{ReadinessFlag, ReadinessGate};
pub use telemetry::{EventRecord, MetricRecord, PropertyValue, TelemetryRecord, TelemetrySink};
pub use watcher::{TransitionPolicy, ValueWatcher, WatcherStatus};
