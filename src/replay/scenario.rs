//! Scripted session format

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::dom::NodeSpec;
use crate::lifecycle::VisibilityState;

/// A page plus the sequence of things that happen to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Root element of the page
    pub page: NodeSpec,
    /// Delay before the telemetry sink reports ready
    #[serde(default)]
    pub ready_after_ms: u64,
    /// Steps applied in order once the engine is running
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One scripted interaction; `target` is a selector resolved at step time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    SetText { target: String, text: String },
    Click { target: String },
    Append { target: String, node: NodeSpec },
    ReplaceChildren { target: String, children: Vec<NodeSpec> },
    Remove { target: String },
    Visibility { state: VisibilityState },
    Unload,
}

/// Load a scenario from a JSON file
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {:?}", path))?;
    let scenario: Scenario = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scenario {:?}", path))?;
    Ok(scenario)
}
