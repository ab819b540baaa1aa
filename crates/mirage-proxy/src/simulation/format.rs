//! Rule-format documents: what `import`, `append` and `export` exchange.

use crate::delay::{FixedDelayRule, LogNormalDelayRule};
use crate::error::{EngineError, Result};
use crate::models::RequestMatcherResponsePair;
use serde::{Deserialize, Serialize};

/// Simulation-wide settings that are not tied to a rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalActions {
    #[serde(default)]
    pub delays: Vec<FixedDelayRule>,
    #[serde(default)]
    pub delays_log_normal: Vec<LogNormalDelayRule>,
}

impl GlobalActions {
    pub fn is_empty(&self) -> bool {
        self.delays.is_empty() && self.delays_log_normal.is_empty()
    }
}

/// An ordered rule set plus its global actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    #[serde(default)]
    pub pairs: Vec<RequestMatcherResponsePair>,
    #[serde(default)]
    pub global_actions: GlobalActions,
}

impl Simulation {
    pub fn new(pairs: Vec<RequestMatcherResponsePair>) -> Self {
        Self {
            pairs,
            global_actions: GlobalActions::default(),
        }
    }

    /// Parse a JSON document: either a bare list of `{requestMatcher, response}`
    /// objects or `{"pairs": [...], "globalActions": {...}}`.
    pub fn from_json(input: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| EngineError::InvalidSimulation(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Array(_) => serde_json::from_value(value)
                .map(Self::new)
                .map_err(|e| EngineError::InvalidSimulation(e.to_string())),
            serde_json::Value::Object(_) => serde_json::from_value(value)
                .map_err(|e| EngineError::InvalidSimulation(e.to_string())),
            other => Err(EngineError::InvalidSimulation(format!(
                "expected a list of pairs or a simulation object, got {other}"
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::InvalidSimulation(e.to_string()))
    }

    /// Every `requiresState` key across all rules.
    pub fn required_state_keys(&self) -> impl Iterator<Item = &String> {
        self.pairs
            .iter()
            .flat_map(|p| p.request_matcher.required_state().map(|(k, _)| k))
    }
}
