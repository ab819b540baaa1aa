//! The six operating modes and the dispatcher that selects between them.
//!
//! # Module Structure
//!
//! - `capture` - forward live and record the exchange
//! - `simulate` - answer from the simulation store
//! - `modify` - forward live through middleware on both legs
//! - `synthesize` - answer from middleware alone
//! - `spy` - simulate, falling back to live on a miss
//! - `diff` - forward live and compare against the simulation

mod capture;
mod diff;
mod modify;
mod simulate;
mod spy;
mod synthesize;

use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::matching::MatchingStrategy;
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::trace;

pub use capture::CaptureMode;
pub use diff::DiffMode;
pub use modify::ModifyMode;
pub use simulate::SimulateMode;
pub use spy::SpyMode;
pub use synthesize::SynthesizeMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Capture,
    #[default]
    Simulate,
    Modify,
    Synthesize,
    Spy,
    Diff,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Capture,
        Mode::Simulate,
        Mode::Modify,
        Mode::Synthesize,
        Mode::Spy,
        Mode::Diff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Capture => "capture",
            Mode::Simulate => "simulate",
            Mode::Modify => "modify",
            Mode::Synthesize => "synthesize",
            Mode::Spy => "spy",
            Mode::Diff => "diff",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim();
        Mode::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| EngineError::InvalidMode(s.to_string()))
    }
}

/// Arguments that tune the active mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeArguments {
    #[serde(alias = "matchingStrategy")]
    pub matching_strategy: MatchingStrategy,
    /// Capture: number repeated identical requests with a `sequence:N` state key.
    pub stateful: bool,
    /// Capture: request headers recorded as exact matchers. `"*"` records all.
    pub headers: Vec<String>,
    /// Capture: replace an existing pair with an equal matcher instead of
    /// keeping the first one.
    #[serde(alias = "overwriteDuplicate")]
    pub overwrite_duplicate: bool,
}

impl ModeArguments {
    pub(crate) fn captures_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|h| h == "*" || h.eq_ignore_ascii_case(name))
    }
}

/// Resolves one request into a response according to a mode's rules.
#[async_trait]
pub trait ModeHandler: Send + Sync {
    fn mode(&self) -> Mode;

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails>;
}

/// Holds one handler per mode and routes requests to the active one.
pub struct ModeDispatcher {
    active: RwLock<Mode>,
    capture: CaptureMode,
    simulate: SimulateMode,
    modify: ModifyMode,
    synthesize: SynthesizeMode,
    spy: SpyMode,
    diff: DiffMode,
}

impl ModeDispatcher {
    pub fn new(context: Arc<EngineContext>, mode: Mode) -> Self {
        Self {
            active: RwLock::new(mode),
            capture: CaptureMode::new(Arc::clone(&context)),
            simulate: SimulateMode::new(Arc::clone(&context)),
            modify: ModifyMode::new(Arc::clone(&context)),
            synthesize: SynthesizeMode::new(Arc::clone(&context)),
            spy: SpyMode::new(Arc::clone(&context)),
            diff: DiffMode::new(context),
        }
    }

    pub fn mode(&self) -> Mode {
        *self.active.read()
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.active.write() = mode;
    }

    pub fn handler(&self, mode: Mode) -> &dyn ModeHandler {
        match mode {
            Mode::Capture => &self.capture,
            Mode::Simulate => &self.simulate,
            Mode::Modify => &self.modify,
            Mode::Synthesize => &self.synthesize,
            Mode::Spy => &self.spy,
            Mode::Diff => &self.diff,
        }
    }

    /// Process `request` with the mode active at the time of the call.
    pub async fn process(&self, request: RequestDetails) -> (Mode, Result<ResponseDetails>) {
        let handler = self.handler(self.mode());
        let mode = handler.mode();
        trace!(mode = %mode, "dispatching {}", request);
        (mode, handler.process(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        for mode in Mode::ALL {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
            assert_eq!(mode.to_string(), mode.as_str());
        }
        assert_eq!("SPY".parse::<Mode>().unwrap(), Mode::Spy);
        assert!(matches!(
            "replay".parse::<Mode>(),
            Err(EngineError::InvalidMode(name)) if name == "replay"
        ));
    }

    #[test]
    fn test_mode_arguments_accept_both_spellings() {
        let args: ModeArguments = serde_json::from_str(
            r#"{"matchingStrategy": "first", "overwriteDuplicate": true, "headers": ["*"]}"#,
        )
        .unwrap();
        assert_eq!(args.matching_strategy, MatchingStrategy::First);
        assert!(args.overwrite_duplicate);
        assert!(args.captures_header("X-Anything"));

        let args: ModeArguments =
            serde_yaml::from_str("matching_strategy: strongest\nheaders: [Accept]\n").unwrap();
        assert_eq!(args.matching_strategy, MatchingStrategy::Strongest);
        assert!(args.captures_header("accept"));
        assert!(!args.captures_header("authorization"));
    }
}
