//! Typed selector table
//!
//! Maps each logical on-screen quantity to an ordered list of selectors.
//! Selectors are tried in order; the first one that resolves wins.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::dom::{Selector, SelectorError};

/// Logical UI element the engine needs to find
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SelectorKey {
    SpinButton,
    BetValue,
    LinesValue,
    BalanceValue,
    WinValue,
}

impl SelectorKey {
    /// Every key, in configuration order
    pub const ALL: [SelectorKey; 5] = [
        SelectorKey::SpinButton,
        SelectorKey::BetValue,
        SelectorKey::LinesValue,
        SelectorKey::BalanceValue,
        SelectorKey::WinValue,
    ];

    /// Name used in configuration files and logs
    pub fn as_str(self) -> &'static str {
        match self {
            SelectorKey::SpinButton => "spinButton",
            SelectorKey::BetValue => "betValue",
            SelectorKey::LinesValue => "linesValue",
            SelectorKey::BalanceValue => "balanceValue",
            SelectorKey::WinValue => "winValue",
        }
    }
}

impl fmt::Display for SelectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Problems found while compiling selector configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A key has no selectors at all
    #[error("no selectors configured for {0}")]
    EmptySelectorList(SelectorKey),
    /// A selector failed to compile
    #[error("invalid selector for {key}: {source}")]
    InvalidSelector {
        key: SelectorKey,
        #[source]
        source: SelectorError,
    },
}

/// Selector strings as they appear in the configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorConfig {
    /// Spin button (delegated click target)
    pub spin_button: Vec<String>,
    /// Current bet amount
    pub bet_value: Vec<String>,
    /// Active pay lines
    pub lines_value: Vec<String>,
    /// Player balance
    pub balance_value: Vec<String>,
    /// Last win amount
    pub win_value: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            spin_button: list(&["button[class*='btn_spin']"]),
            bet_value: list(&[".label_bet", ".bet .value"]),
            lines_value: list(&[".label_lines", ".lines .value"]),
            balance_value: list(&[".label_balance"]),
            win_value: list(&[".label_win", ".label_win_total"]),
        }
    }
}

impl SelectorConfig {
    /// Raw selector strings for a key
    pub fn get(&self, key: SelectorKey) -> &[String] {
        match key {
            SelectorKey::SpinButton => &self.spin_button,
            SelectorKey::BetValue => &self.bet_value,
            SelectorKey::LinesValue => &self.lines_value,
            SelectorKey::BalanceValue => &self.balance_value,
            SelectorKey::WinValue => &self.win_value,
        }
    }

    /// Compile every selector, failing on the first bad entry
    pub fn compile(&self) -> Result<SelectorTable, ConfigError> {
        let mut entries = HashMap::new();
        for key in SelectorKey::ALL {
            let raw = self.get(key);
            if raw.is_empty() {
                return Err(ConfigError::EmptySelectorList(key));
            }
            let compiled = raw
                .iter()
                .map(|source| Selector::parse(source))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| ConfigError::InvalidSelector { key, source })?;
            entries.insert(key, compiled);
        }
        Ok(SelectorTable { entries })
    }
}

/// Compiled selectors, one ordered list per key
#[derive(Debug, Clone)]
pub struct SelectorTable {
    entries: HashMap<SelectorKey, Vec<Selector>>,
}

impl SelectorTable {
    /// Selectors for a key, in resolution order
    pub fn get(&self, key: SelectorKey) -> &[Selector] {
        self.entries.get(&key).map(Vec::as_slice).unwrap_or_default()
    }
}

impl Default for SelectorTable {
    fn default() -> Self {
        SelectorConfig::default()
            .compile()
            .unwrap_or_else(|_| SelectorTable { entries: HashMap::new() })
    }
}
