//! Mirage: an HTTP service virtualization engine.
//!
//! Requests are resolved according to one of six modes: captured from a live
//! service, simulated from stored rules, modified or synthesized by
//! middleware, spied (simulated with live fallback) or diffed against the live
//! service.

pub mod cache;
pub mod config;
pub mod context;
pub mod delay;
pub mod diff;
pub mod engine;
pub mod error;
pub mod forwarding;
pub mod matching;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod modes;
pub mod server;
pub mod simulation;
pub mod state;
pub mod template;

pub use engine::{error_response, Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use modes::{Mode, ModeArguments};
