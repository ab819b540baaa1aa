//! Request matching against the simulation.
//!
//! # Module Structure
//!
//! - `field` - evaluators for each field matcher kind and matcher chaining
//! - `json` / `xml` - structural sub-tree comparison used by the body matchers
//! - `request` - evaluation of one rule against one request
//! - `strategy` - `first`/`strongest` selection, closest miss and cacheability

mod field;
mod json;
mod request;
mod strategy;
mod xml;

pub use field::{extract_json_path, field_matches, matches_all};
pub use json::{json_contains, json_partial_match};
pub use request::{evaluate_rule, RuleEvaluation};
pub use strategy::{match_request, ClosestMiss, MatchResult, MatchingFailure, MatchingStrategy};
pub use xml::{extract_xpath, xml_partial_match};
