//! Session lifecycle events

use serde::{Deserialize, Serialize};

use crate::telemetry::{EventRecord, GAME_HIDDEN, GAME_LOADED, GAME_SESSION_ENDED, GAME_VISIBLE};

/// Page visibility as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityState {
    Visible,
    Hidden,
}

/// Emits load, visibility and session-end events
#[derive(Debug, Default)]
pub struct SessionLifecycleReporter {
    loaded: bool,
    ended: bool,
}

impl SessionLifecycleReporter {
    /// Create a reporter that has not yet reported anything
    pub fn new() -> Self {
        Self::default()
    }

    /// `GameLoaded`, the first time only
    pub fn loaded(&mut self) -> Option<EventRecord> {
        if std::mem::replace(&mut self.loaded, true) {
            return None;
        }
        Some(EventRecord::new(GAME_LOADED))
    }

    /// One event per reported visibility transition
    pub fn visibility_changed(&self, state: VisibilityState) -> EventRecord {
        match state {
            VisibilityState::Hidden => EventRecord::new(GAME_HIDDEN),
            VisibilityState::Visible => EventRecord::new(GAME_VISIBLE),
        }
    }

    /// `GameSessionEnded`, the first time only
    pub fn unloading(&mut self) -> Option<EventRecord> {
        if std::mem::replace(&mut self.ended, true) {
            return None;
        }
        Some(EventRecord::new(GAME_SESSION_ENDED))
    }
}
