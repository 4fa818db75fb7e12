//! Telemetry engine
//!
//! Owns the document capability, the sink and every watcher. All work runs
//! to completion on the caller's thread in response to host notifications,
//! so each watcher's state is only ever touched by one callback at a time.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ReadinessSettings, SelectorKey, SelectorTable};
use crate::dom::{resolve_first, Document, NodeId};
use crate::lifecycle::{SessionLifecycleReporter, VisibilityState};
use crate::readiness::{wait_until_ready, ReadinessError, ReadinessGate};
use crate::spin::SpinDetector;
use crate::telemetry::{TelemetryRecord, TelemetrySink};
use crate::watcher::{TransitionPolicy, ValueWatcher, WatcherStatus};

/// Notifications delivered by the host page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    /// A click landed on `target`
    Click { target: NodeId },
    /// The page's visibility state changed
    VisibilityChanged(VisibilityState),
    /// The page is about to be discarded
    BeforeUnload,
}

/// Snapshot of the engine for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    pub started: bool,
    pub stopped: bool,
    pub win: WatcherStatus,
    pub balance: WatcherStatus,
    pub events_emitted: u64,
    pub metrics_emitted: u64,
}

/// Change-detection engine for one page session
pub struct TelemetryEngine<D: Document, S: TelemetrySink> {
    document: D,
    sink: S,
    selectors: SelectorTable,
    win: ValueWatcher,
    balance: ValueWatcher,
    spin: SpinDetector,
    lifecycle: SessionLifecycleReporter,
    started: bool,
    stopped: bool,
    events_emitted: u64,
    metrics_emitted: u64,
}

impl<D: Document, S: TelemetrySink> TelemetryEngine<D, S> {
    /// Create an engine; nothing is observed or emitted until [`start`](Self::start)
    pub fn new(document: D, sink: S, selectors: SelectorTable) -> Self {
        let spin = SpinDetector::new(&selectors);
        Self {
            document,
            sink,
            selectors,
            win: ValueWatcher::new("win", TransitionPolicy::Win),
            balance: ValueWatcher::new("balance", TransitionPolicy::Delta),
            spin,
            lifecycle: SessionLifecycleReporter::new(),
            started: false,
            stopped: false,
            events_emitted: 0,
            metrics_emitted: 0,
        }
    }

    /// The observed document
    pub fn document(&self) -> &D {
        &self.document
    }

    /// Mutable access to the observed document
    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    /// The sink records are delivered to
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Bind every watcher and emit `GameLoaded`
    ///
    /// Must only be called once the sink is ready. Later calls do nothing.
    pub fn start(&mut self) {
        if self.started {
            debug!("Engine already started, ignoring start()");
            return;
        }
        self.started = true;

        if let Some(event) = self.lifecycle.loaded() {
            self.emit(event.into());
        }

        self.spin.bind();

        let win_target = resolve_first(&self.document, self.selectors.get(SelectorKey::WinValue));
        self.win.bind(&mut self.document, win_target);

        let balance_target = resolve_first(&self.document, self.selectors.get(SelectorKey::BalanceValue));
        self.balance.bind(&mut self.document, balance_target);

        info!(
            "Telemetry engine started (win: {:?}, balance: {:?})",
            self.win.status(),
            self.balance.status()
        );
    }

    /// Dispatch one host notification
    pub fn handle(&mut self, signal: PageSignal) {
        if !self.started || self.stopped {
            debug!("Engine not running, dropping {:?}", signal);
            return;
        }

        match signal {
            PageSignal::Click { target } => {
                if let Some(event) = self.spin.on_click(&self.document, target) {
                    self.emit(event.into());
                }
            }
            PageSignal::VisibilityChanged(state) => {
                let event = self.lifecycle.visibility_changed(state);
                self.emit(event.into());
            }
            PageSignal::BeforeUnload => {
                if let Some(event) = self.lifecycle.unloading() {
                    self.emit(event.into());
                }
            }
        }
    }

    /// Process every pending mutation notification, in order
    ///
    /// Returns how many notifications were drained.
    pub fn flush_mutations(&mut self) -> usize {
        let notifications = self.document.take_mutations();
        let count = notifications.len();

        for subscription in notifications {
            let records = if self.win.subscription() == Some(subscription) {
                self.win.on_mutation(&self.document)
            } else if self.balance.subscription() == Some(subscription) {
                self.balance.on_mutation(&self.document)
            } else {
                debug!("No watcher for subscription {:?}", subscription);
                Vec::new()
            };

            for record in records {
                self.emit(record);
            }
        }

        count
    }

    /// Release every subscription; best effort, safe to call repeatedly
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.win.release(&mut self.document);
        self.balance.release(&mut self.document);
        info!(
            "Telemetry engine stopped after {} events and {} metrics",
            self.events_emitted, self.metrics_emitted
        );
    }

    /// Current engine status
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            started: self.started,
            stopped: self.stopped,
            win: self.win.status(),
            balance: self.balance.status(),
            events_emitted: self.events_emitted,
            metrics_emitted: self.metrics_emitted,
        }
    }

    fn emit(&mut self, record: TelemetryRecord) {
        match &record {
            TelemetryRecord::Event(_) => self.events_emitted += 1,
            TelemetryRecord::Metric(_) => self.metrics_emitted += 1,
        }
        self.sink.track(record);
    }
}

/// Wait for the sink, then start the engine
///
/// On timeout or cancellation the engine is left unstarted and never emits.
pub async fn start_when_ready<D, S, G>(
    engine: &mut TelemetryEngine<D, S>,
    gate: &G,
    settings: &ReadinessSettings,
    cancel: &CancellationToken,
) -> Result<(), ReadinessError>
where
    D: Document,
    S: TelemetrySink,
    G: ReadinessGate + ?Sized,
{
    match wait_until_ready(gate, settings.poll_interval(), settings.timeout(), cancel).await {
        Ok(polls) => {
            debug!("Starting engine after {} readiness checks", polls);
            engine.start();
            Ok(())
        }
        Err(e) => {
            warn!("Telemetry engine not started: {}", e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{NodeSpec, Selector, VirtualDocument};
    use crate::readiness::ReadinessFlag;
    use crate::telemetry::{
        PropertyValue, RecordingSink, BALANCE_CHANGED, GAME_HIDDEN, GAME_LOADED, GAME_SESSION_ENDED,
        GAME_VISIBLE, SPIN_CLICKED, WIN_DETECTED,
    };
    use std::time::Duration;

    fn page() -> VirtualDocument {
        VirtualDocument::new(
            &NodeSpec::new("body")
                .with_child(NodeSpec::new("div").with_class("label_bet").with_text("1.00"))
                .with_child(NodeSpec::new("div").with_class("label_lines").with_text("10"))
                .with_child(NodeSpec::new("div").with_class("label_balance").with_text("1000"))
                .with_child(NodeSpec::new("div").with_class("label_win").with_text("0"))
                .with_child(
                    NodeSpec::new("button")
                        .with_class("btn_spin")
                        .with_child(NodeSpec::new("span").with_class("icon")),
                ),
        )
    }

    fn engine() -> (TelemetryEngine<VirtualDocument, RecordingSink>, RecordingSink) {
        let sink = RecordingSink::new();
        let engine = TelemetryEngine::new(page(), sink.clone(), SelectorTable::default());
        (engine, sink)
    }

    fn node(engine: &TelemetryEngine<VirtualDocument, RecordingSink>, selector: &str) -> NodeId {
        engine
            .document()
            .query_selector(&Selector::parse(selector).unwrap())
            .unwrap()
    }

    fn set_text(engine: &mut TelemetryEngine<VirtualDocument, RecordingSink>, selector: &str, text: &str) {
        let target = node(engine, selector);
        engine.document_mut().set_text(target, text).unwrap();
        engine.flush_mutations();
    }

    fn names(sink: &RecordingSink) -> Vec<String> {
        sink.records().iter().map(|record| record.name().to_string()).collect()
    }

    #[test]
    fn test_start_emits_loaded_and_binds() {
        let (mut engine, sink) = engine();
        engine.start();

        assert_eq!(names(&sink), vec![GAME_LOADED]);
        let status = engine.status();
        assert!(status.started);
        assert_eq!(status.win, WatcherStatus::Observing);
        assert_eq!(status.balance, WatcherStatus::Observing);
        assert_eq!(engine.document().subscription_count(), 2);
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut engine, sink) = engine();
        engine.start();
        engine.start();

        assert_eq!(sink.events_named(GAME_LOADED).len(), 1);
        assert_eq!(engine.document().subscription_count(), 2);

        set_text(&mut engine, ".label_win", "25");
        assert_eq!(sink.events_named(WIN_DETECTED).len(), 1);
    }

    #[test]
    fn test_nothing_before_start() {
        let (mut engine, sink) = engine();
        let button = node(&engine, "button");
        engine.handle(PageSignal::Click { target: button });
        engine.handle(PageSignal::VisibilityChanged(VisibilityState::Hidden));
        set_text(&mut engine, ".label_win", "25");
        assert!(sink.records().is_empty());
    }

    #[test]
    fn test_win_and_balance_flow() {
        let (mut engine, sink) = engine();
        engine.start();

        for win in ["0", "50", "50", "80", "0", "80"] {
            set_text(&mut engine, ".label_win", win);
        }
        for balance in ["1000", "950", "950", "1200"] {
            set_text(&mut engine, ".label_balance", balance);
        }

        let wins = sink.events_named(WIN_DETECTED);
        assert_eq!(wins.len(), 2);
        assert_eq!(sink.metrics().len(), 2);

        let changes = sink.events_named(BALANCE_CHANGED);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].property("delta"), Some(&PropertyValue::Number(-50.0)));
        assert_eq!(changes[1].property("delta"), Some(&PropertyValue::Number(250.0)));

        let status = engine.status();
        assert_eq!(status.events_emitted, 5);
        assert_eq!(status.metrics_emitted, 2);
    }

    #[test]
    fn test_spin_click_snapshot() {
        let (mut engine, sink) = engine();
        engine.start();

        let icon = node(&engine, ".icon");
        engine.handle(PageSignal::Click { target: icon });
        let other = node(&engine, ".label_bet");
        engine.handle(PageSignal::Click { target: other });

        let spins = sink.events_named(SPIN_CLICKED);
        assert_eq!(spins.len(), 1);
        assert_eq!(spins[0].property("bet"), Some(&PropertyValue::Number(1.0)));
        assert_eq!(spins[0].property("lines"), Some(&PropertyValue::Number(10.0)));
        assert_eq!(spins[0].property("balance"), Some(&PropertyValue::Number(1000.0)));
    }

    #[test]
    fn test_lifecycle_signals() {
        let (mut engine, sink) = engine();
        engine.start();
        engine.handle(PageSignal::VisibilityChanged(VisibilityState::Hidden));
        engine.handle(PageSignal::VisibilityChanged(VisibilityState::Visible));
        engine.handle(PageSignal::BeforeUnload);
        engine.handle(PageSignal::BeforeUnload);

        assert_eq!(
            names(&sink),
            vec![GAME_LOADED, GAME_HIDDEN, GAME_VISIBLE, GAME_SESSION_ENDED]
        );
    }

    #[test]
    fn test_missing_targets_never_emit() {
        let sink = RecordingSink::new();
        let document = VirtualDocument::new(&NodeSpec::new("body").with_child(NodeSpec::new("p").with_text("7")));
        let mut engine = TelemetryEngine::new(document, sink.clone(), SelectorTable::default());
        engine.start();

        let status = engine.status();
        assert_eq!(status.win, WatcherStatus::Inert);
        assert_eq!(status.balance, WatcherStatus::Inert);

        let paragraph = node_in(engine.document(), "p");
        engine.document_mut().set_text(paragraph, "9").unwrap();
        assert_eq!(engine.flush_mutations(), 0);

        // Appearing later does not revive the watchers
        let root = engine.document().root();
        engine
            .document_mut()
            .append_child(root, &NodeSpec::new("div").with_class("label_win").with_text("100"))
            .unwrap();
        engine.flush_mutations();
        assert_eq!(names(&sink), vec![GAME_LOADED]);
    }

    fn node_in(document: &VirtualDocument, selector: &str) -> NodeId {
        document.query_selector(&Selector::parse(selector).unwrap()).unwrap()
    }

    #[test]
    fn test_stop_releases_and_silences() {
        let (mut engine, sink) = engine();
        engine.start();
        engine.stop();
        engine.stop();

        assert_eq!(engine.document().subscription_count(), 0);
        let status = engine.status();
        assert!(status.stopped);
        assert_eq!(status.win, WatcherStatus::Released);

        set_text(&mut engine, ".label_win", "500");
        engine.handle(PageSignal::BeforeUnload);
        assert_eq!(names(&sink), vec![GAME_LOADED]);
    }

    #[test]
    fn test_watchers_ignore_each_others_mutations() {
        let (mut engine, sink) = engine();
        engine.start();
        set_text(&mut engine, ".label_bet", "2.00");
        set_text(&mut engine, ".label_balance", "990");
        assert_eq!(sink.events_named(BALANCE_CHANGED).len(), 1);
        assert!(sink.events_named(WIN_DETECTED).is_empty());
    }

    #[tokio::test]
    async fn test_start_when_ready() {
        let (mut engine, sink) = engine();
        let flag = ReadinessFlag::new();
        let settings = ReadinessSettings {
            poll_interval_ms: 5,
            timeout_ms: None,
        };

        let setter = flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            setter.mark_ready();
        });

        start_when_ready(&mut engine, &flag, &settings, &CancellationToken::new())
            .await
            .unwrap();
        assert!(engine.status().started);
        assert_eq!(names(&sink), vec![GAME_LOADED]);
    }

    #[tokio::test]
    async fn test_start_when_ready_timeout_leaves_engine_idle() {
        let (mut engine, sink) = engine();
        let settings = ReadinessSettings {
            poll_interval_ms: 5,
            timeout_ms: Some(15),
        };
        let never = || false;

        let result = start_when_ready(&mut engine, &never, &settings, &CancellationToken::new()).await;
        assert!(matches!(result, Err(ReadinessError::TimedOut(_))));
        assert!(!engine.status().started);
        assert!(sink.records().is_empty());
    }
}
