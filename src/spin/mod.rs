//! Spin gesture detection
//!
//! Clicks are matched by delegation: the click target or any of its
//! ancestors must match the spin button selectors. Nothing is bound to the
//! button itself, so re-rendering it does not break detection. Bet, lines
//! and balance are read fresh on every qualifying click.

use tracing::debug;

use crate::config::{SelectorKey, SelectorTable};
use crate::dom::{closest_any, resolve_first, Document, NodeId, Selector};
use crate::parser::read_number;
use crate::telemetry::{EventRecord, SPIN_CLICKED};

/// Delegated click detector for the spin button
#[derive(Debug, Clone)]
pub struct SpinDetector {
    button: Vec<Selector>,
    bet: Vec<Selector>,
    lines: Vec<Selector>,
    balance: Vec<Selector>,
    bound: bool,
}

impl SpinDetector {
    /// Build a detector from the compiled selector table
    pub fn new(selectors: &SelectorTable) -> Self {
        Self {
            button: selectors.get(SelectorKey::SpinButton).to_vec(),
            bet: selectors.get(SelectorKey::BetValue).to_vec(),
            lines: selectors.get(SelectorKey::LinesValue).to_vec(),
            balance: selectors.get(SelectorKey::BalanceValue).to_vec(),
            bound: false,
        }
    }

    /// Install the document-level listener; returns false if already installed
    pub fn bind(&mut self) -> bool {
        if self.bound {
            return false;
        }
        self.bound = true;
        true
    }

    /// Whether the listener is installed
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    /// Handle a click anywhere in the document
    ///
    /// Every qualifying click yields exactly one event; no debouncing.
    pub fn on_click<D: Document + ?Sized>(&self, document: &D, target: NodeId) -> Option<EventRecord> {
        if !self.bound {
            return None;
        }
        let button = closest_any(document, target, &self.button)?;
        debug!("Spin click on {} (target {})", button, target);

        let bet = read_number(document, resolve_first(document, &self.bet));
        let lines = read_number(document, resolve_first(document, &self.lines));
        let balance = read_number(document, resolve_first(document, &self.balance));

        Some(
            EventRecord::new(SPIN_CLICKED)
                .with_property("bet", bet)
                .with_property("lines", lines)
                .with_property("balance", balance),
        )
    }
}
