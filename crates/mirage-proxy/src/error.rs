//! Error types surfaced by the engine.
//!
//! Cache misses and unsatisfied state preconditions are not errors: the former
//! is an `Option::None` from the cache, the latter is an ordinary non-match.

use crate::matching::MatchingFailure;

/// Errors produced while resolving a request into a response.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No rule matched the request. Carries the closest miss, when one exists.
    #[error("{0}")]
    MatchingFailed(Box<MatchingFailure>),

    #[error("middleware not set")]
    MiddlewareNotSet,

    /// The middleware collaborator failed. Keeps enough context for an operator
    /// to reproduce the failure outside the engine.
    #[error("middleware execution failed ({command}): {message}")]
    MiddlewareExecutionFailed {
        command: String,
        stdout: String,
        stderr: String,
        message: String,
    },

    /// Live-request transport error.
    #[error("forwarding failed: {0}")]
    ForwardingFailed(String),

    #[error("invalid mode '{0}', expected one of: capture, simulate, modify, synthesize, spy, diff")]
    InvalidMode(String),

    #[error("invalid simulation: {0}")]
    InvalidSimulation(String),

    #[error("template error: {0}")]
    Template(String),
}

impl EngineError {
    /// Short, stable label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::MatchingFailed(_) => "matching_failed",
            EngineError::MiddlewareNotSet => "middleware_not_set",
            EngineError::MiddlewareExecutionFailed { .. } => "middleware_failed",
            EngineError::ForwardingFailed(_) => "forwarding_failed",
            EngineError::InvalidMode(_) => "invalid_mode",
            EngineError::InvalidSimulation(_) => "invalid_simulation",
            EngineError::Template(_) => "template",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
