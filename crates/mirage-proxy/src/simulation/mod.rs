//! The simulation: the ordered rule set the matcher searches, plus global
//! delay configuration.
//!
//! # Module Structure
//!
//! - `format` - the JSON rule format (`Simulation`, `GlobalActions`)
//! - `store` - the shared, de-duplicated `SimulationStore`

mod format;
mod store;

pub use format::{GlobalActions, Simulation};
pub use store::SimulationStore;
