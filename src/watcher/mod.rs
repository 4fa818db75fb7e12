//! Value watchers
//!
//! A watcher observes one node's subtree, re-reads its text on every
//! mutation notification and hands the parsed reading to a transition
//! policy. The policy is a pure function of the previous state and the new
//! reading, so it can be exercised without any document at all.

use tracing::{debug, info};

use crate::dom::{Document, NodeId, SubscriptionId};
use crate::parser::parse_number;
use crate::telemetry::{
    EventRecord, MetricRecord, TelemetryRecord, BALANCE_CHANGED, WIN_AMOUNT_METRIC, WIN_DETECTED,
};

/// Converts raw node text into a reading
pub type Extractor = fn(&str) -> Option<f64>;

/// Rule deciding whether a reading is an event-worthy change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Fire on every positive reading that differs from the last one fired
    Win,
    /// Fire on every reading that differs from the previous reading
    Delta,
}

/// Outcome of applying a policy to one reading
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// State to keep for the next comparison
    pub next: Option<f64>,
    /// Records to emit, in order
    pub records: Vec<TelemetryRecord>,
}

impl TransitionPolicy {
    /// State right after binding, given the reading available at that moment
    pub fn initial_state(self, first_reading: Option<f64>) -> Option<f64> {
        match self {
            // Unset, so a zero or missing first reading can never fire
            TransitionPolicy::Win => None,
            TransitionPolicy::Delta => first_reading,
        }
    }

    /// Decide what a new reading means
    ///
    /// An absent reading never emits and never changes state.
    pub fn apply(self, previous: Option<f64>, current: Option<f64>) -> Transition {
        let Some(current) = current else {
            return Transition {
                next: previous,
                records: Vec::new(),
            };
        };

        match self {
            TransitionPolicy::Win => {
                if current > 0.0 && previous != Some(current) {
                    Transition {
                        next: Some(current),
                        records: vec![
                            EventRecord::new(WIN_DETECTED)
                                .with_property("winAmount", current)
                                .into(),
                            MetricRecord::new(WIN_AMOUNT_METRIC, current).into(),
                        ],
                    }
                } else {
                    Transition {
                        next: previous,
                        records: Vec::new(),
                    }
                }
            }
            TransitionPolicy::Delta => {
                let records = match previous {
                    Some(previous) if previous != current => vec![EventRecord::new(BALANCE_CHANGED)
                        .with_property("previous", previous)
                        .with_property("current", current)
                        .with_property("delta", current - previous)
                        .into()],
                    _ => Vec::new(),
                };
                // Every present reading becomes the new baseline
                Transition {
                    next: Some(current),
                    records,
                }
            }
        }
    }
}

/// Binding state of a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherStatus {
    /// `bind` has not been called
    Unbound,
    /// Target was missing at bind time; the watcher never observes
    Inert,
    /// Subscribed to the target's subtree
    Observing,
    /// Subscription released on teardown
    Released,
}

/// Watches one node and derives records from its content changes
#[derive(Debug)]
pub struct ValueWatcher {
    label: &'static str,
    policy: TransitionPolicy,
    extract: Extractor,
    target: Option<NodeId>,
    subscription: Option<SubscriptionId>,
    last_value: Option<f64>,
    status: WatcherStatus,
}

impl ValueWatcher {
    /// Create an unbound watcher using the default numeric parser
    pub fn new(label: &'static str, policy: TransitionPolicy) -> Self {
        Self {
            label,
            policy,
            extract: parse_number,
            target: None,
            subscription: None,
            last_value: None,
            status: WatcherStatus::Unbound,
        }
    }

    /// Replace the text extraction function
    pub fn with_extractor(mut self, extract: Extractor) -> Self {
        self.extract = extract;
        self
    }

    /// Name used in logs
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Current binding state
    pub fn status(&self) -> WatcherStatus {
        self.status
    }

    /// Last value kept for comparison
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Live subscription handle, if observing
    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    /// Attach to `target`; only the first call has any effect
    pub fn bind<D: Document + ?Sized>(&mut self, document: &mut D, target: Option<NodeId>) -> WatcherStatus {
        if self.status != WatcherStatus::Unbound {
            debug!("{} watcher already bound ({:?}), ignoring", self.label, self.status);
            return self.status;
        }

        let Some(node) = target else {
            debug!("{} target not found, watcher inert", self.label);
            self.status = WatcherStatus::Inert;
            return self.status;
        };

        let first_reading = self.read(&*document, node);
        self.last_value = self.policy.initial_state(first_reading);
        self.target = Some(node);
        self.subscription = Some(document.observe_subtree(node));
        self.status = WatcherStatus::Observing;

        info!(
            "{} watcher observing {} (baseline {:?})",
            self.label, node, self.last_value
        );
        self.status
    }

    /// React to one mutation notification for this watcher's subscription
    pub fn on_mutation<D: Document + ?Sized>(&mut self, document: &D) -> Vec<TelemetryRecord> {
        match (self.status, self.target) {
            (WatcherStatus::Observing, Some(node)) => {
                let reading = self.read(document, node);
                self.observe(reading)
            }
            _ => Vec::new(),
        }
    }

    /// Feed one reading through the policy and keep the resulting state
    pub fn observe(&mut self, reading: Option<f64>) -> Vec<TelemetryRecord> {
        let transition = self.policy.apply(self.last_value, reading);
        self.last_value = transition.next;
        transition.records
    }

    /// Release the subscription; the watcher stays silent afterwards
    pub fn release<D: Document + ?Sized>(&mut self, document: &mut D) {
        if let Some(subscription) = self.subscription.take() {
            document.disconnect(subscription);
            debug!("{} watcher released", self.label);
        }
        if self.status == WatcherStatus::Observing {
            self.status = WatcherStatus::Released;
        }
    }

    fn read<D: Document + ?Sized>(&self, document: &D, node: NodeId) -> Option<f64> {
        let text = document.text_content(node)?;
        let reading = (self.extract)(&text);
        if reading.is_none() {
            debug!("{} content {:?} is not numeric, ignoring", self.label, text);
        }
        reading
    }
}
