//! Scripted session replay
//!
//! Builds a [`VirtualDocument`] from a scenario, waits for the sink to
//! become ready, starts the engine and applies each step, flushing mutation
//! notifications after every one.

pub mod scenario;

pub use scenario::{load_scenario, Scenario, Step};

use anyhow::{anyhow, bail, Context, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ReadinessSettings, SelectorTable};
use crate::dom::{Document, NodeId, Selector, VirtualDocument};
use crate::engine::{start_when_ready, EngineStatus, PageSignal, TelemetryEngine};
use crate::readiness::{ReadinessError, ReadinessFlag};
use crate::telemetry::TelemetrySink;

/// Outcome of a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    /// Steps applied after the engine started
    pub steps_applied: usize,
    /// Mutation notifications processed
    pub mutations: usize,
    /// Engine state at the end of the run
    pub status: EngineStatus,
}

/// Replay a scenario against a fresh engine
pub async fn replay<S: TelemetrySink>(
    scenario: Scenario,
    selectors: SelectorTable,
    sink: S,
    readiness: &ReadinessSettings,
    cancel: &CancellationToken,
) -> Result<ReplayReport> {
    let document = VirtualDocument::new(&scenario.page);
    let mut engine = TelemetryEngine::new(document, sink, selectors);

    let flag = ReadinessFlag::new();
    if scenario.ready_after_ms == 0 {
        flag.mark_ready();
    } else {
        let setter = flag.clone();
        let delay = Duration::from_millis(scenario.ready_after_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            setter.mark_ready();
        });
    }

    match start_when_ready(&mut engine, &flag, readiness, cancel).await {
        Ok(()) => {}
        Err(ReadinessError::Cancelled) => bail!("Replay cancelled before the sink became ready"),
        Err(ReadinessError::TimedOut(limit)) => {
            warn!("Sink never became ready within {:?}; no telemetry recorded", limit);
            return Ok(ReplayReport {
                steps_applied: 0,
                mutations: 0,
                status: engine.status(),
            });
        }
    }

    let mut steps_applied = 0;
    let mut mutations = 0;
    for (index, step) in scenario.steps.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!("Replay cancelled after {} steps", steps_applied);
            break;
        }
        apply_step(&mut engine, step).with_context(|| format!("Step {} ({:?}) failed", index + 1, step))?;
        mutations += engine.flush_mutations();
        steps_applied += 1;
    }

    engine.stop();
    let status = engine.status();
    info!(
        "Replay finished: {} steps, {} mutations, {} events, {} metrics",
        steps_applied, mutations, status.events_emitted, status.metrics_emitted
    );

    Ok(ReplayReport {
        steps_applied,
        mutations,
        status,
    })
}

fn apply_step<S: TelemetrySink>(engine: &mut TelemetryEngine<VirtualDocument, S>, step: &Step) -> Result<()> {
    debug!("Applying {:?}", step);
    match step {
        Step::SetText { target, text } => {
            let node = resolve(engine.document(), target)?;
            engine.document_mut().set_text(node, text.as_str())?;
        }
        Step::Click { target } => {
            let node = resolve(engine.document(), target)?;
            engine.handle(PageSignal::Click { target: node });
        }
        Step::Append { target, node } => {
            let parent = resolve(engine.document(), target)?;
            engine.document_mut().append_child(parent, node)?;
        }
        Step::ReplaceChildren { target, children } => {
            let parent = resolve(engine.document(), target)?;
            engine.document_mut().replace_children(parent, children)?;
        }
        Step::Remove { target } => {
            let node = resolve(engine.document(), target)?;
            engine.document_mut().remove(node)?;
        }
        Step::Visibility { state } => engine.handle(PageSignal::VisibilityChanged(*state)),
        Step::Unload => engine.handle(PageSignal::BeforeUnload),
    }
    Ok(())
}

fn resolve(document: &VirtualDocument, target: &str) -> Result<NodeId> {
    let selector = Selector::parse(target)?;
    document
        .query_selector(&selector)
        .ok_or_else(|| anyhow!("Target {:?} not found", target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodeSpec;
    use crate::lifecycle::VisibilityState;
    use crate::telemetry::{
        LogLinesSink, PropertyValue, RecordingSink, BALANCE_CHANGED, GAME_HIDDEN, GAME_LOADED, GAME_SESSION_ENDED,
        SPIN_CLICKED, WIN_DETECTED,
    };

    fn settings() -> ReadinessSettings {
        ReadinessSettings {
            poll_interval_ms: 5,
            timeout_ms: Some(1_000),
        }
    }

    fn page() -> NodeSpec {
        NodeSpec::new("body")
            .with_child(
                NodeSpec::new("div")
                    .with_class("bet")
                    .with_child(NodeSpec::new("span").with_class("value").with_text("2")),
            )
            .with_child(NodeSpec::new("div").with_class("label_lines").with_text("25"))
            .with_child(NodeSpec::new("div").with_class("label_balance").with_text("100.00"))
            .with_child(NodeSpec::new("div").with_class("label_win_total").with_text(""))
            .with_child(
                NodeSpec::new("div")
                    .with_id("controls")
                    .with_child(NodeSpec::new("button").with_class("btn_spin").with_text("SPIN")),
            )
    }

    fn set_text(target: &str, text: &str) -> Step {
        Step::SetText {
            target: target.into(),
            text: text.into(),
        }
    }

    #[tokio::test]
    async fn test_full_session() {
        let scenario = Scenario {
            page: page(),
            ready_after_ms: 20,
            steps: vec![
                Step::Click {
                    target: ".btn_spin".into(),
                },
                set_text(".label_balance", "98.00"),
                set_text(".label_win_total", "10.00"),
                set_text(".label_balance", "108.00"),
                // Re-rendered controls keep working through delegation
                Step::ReplaceChildren {
                    target: "#controls".into(),
                    children: vec![NodeSpec::new("button").with_class("btn_spin").with_text("SPIN")],
                },
                Step::Click {
                    target: "#controls button".into(),
                },
                Step::Visibility {
                    state: VisibilityState::Hidden,
                },
                Step::Unload,
            ],
        };

        let sink = RecordingSink::new();
        let report = replay(
            scenario,
            SelectorTable::default(),
            sink.clone(),
            &settings(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.steps_applied, 8);
        assert_eq!(report.mutations, 3);
        assert!(report.status.stopped);

        let names: Vec<_> = sink.events().into_iter().map(|event| event.name).collect();
        assert_eq!(
            names,
            vec![
                GAME_LOADED,
                SPIN_CLICKED,
                BALANCE_CHANGED,
                WIN_DETECTED,
                BALANCE_CHANGED,
                SPIN_CLICKED,
                GAME_HIDDEN,
                GAME_SESSION_ENDED,
            ]
        );

        let spins = sink.events_named(SPIN_CLICKED);
        assert_eq!(spins[0].property("bet"), Some(&PropertyValue::Number(2.0)));
        assert_eq!(spins[0].property("balance"), Some(&PropertyValue::Number(100.0)));
        assert_eq!(spins[1].property("balance"), Some(&PropertyValue::Number(108.0)));
        assert_eq!(sink.metrics().len(), 1);
    }

    #[tokio::test]
    async fn test_log_lines_written_to_file() {
        let scenario = Scenario {
            page: page(),
            ready_after_ms: 0,
            steps: vec![
                Step::Click {
                    target: ".btn_spin".into(),
                },
                set_text(".label_win_total", "10.00"),
                Step::Unload,
            ],
        };
        let output = tempfile::NamedTempFile::new().unwrap();
        let file = output.reopen().unwrap();

        let report = replay(
            scenario,
            SelectorTable::default(),
            LogLinesSink::new(std::io::BufWriter::new(file)),
            &settings(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.steps_applied, 3);

        let written = std::fs::read_to_string(output.path()).unwrap();
        let lines: Vec<_> = written.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].contains("event GameLoaded"));
        assert!(lines[1].contains("event SpinClicked"));
        assert!(lines[2].contains("event WinDetected"));
        assert_eq!(lines[3], "metric WinAmount value=10");
        assert!(lines[4].contains("event GameSessionEnded"));
    }

    #[tokio::test]
    async fn test_unknown_target_fails() {
        let scenario = Scenario {
            page: page(),
            ready_after_ms: 0,
            steps: vec![Step::Click {
                target: "#nope".into(),
            }],
        };

        let result = replay(
            scenario,
            SelectorTable::default(),
            RecordingSink::new(),
            &settings(),
            &CancellationToken::new(),
        )
        .await;
        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("#nope"));
    }

    #[tokio::test]
    async fn test_cancelled_before_ready() {
        let scenario = Scenario {
            page: page(),
            ready_after_ms: 10_000,
            steps: Vec::new(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sink = RecordingSink::new();
        let result = replay(scenario, SelectorTable::default(), sink.clone(), &settings(), &cancel).await;
        assert!(result.is_err());
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_records_nothing() {
        let scenario = Scenario {
            page: page(),
            ready_after_ms: 10_000,
            steps: vec![Step::Unload],
        };
        let readiness = ReadinessSettings {
            poll_interval_ms: 5,
            timeout_ms: Some(20),
        };

        let sink = RecordingSink::new();
        let report = replay(
            scenario,
            SelectorTable::default(),
            sink.clone(),
            &readiness,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!report.status.started);
        assert_eq!(report.steps_applied, 0);
        assert!(sink.records().is_empty());
    }
}
