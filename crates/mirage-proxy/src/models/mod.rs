//! Data model shared by every engine component.
//!
//! - `request` - `RequestDetails`, fingerprints and the simplified request identity
//! - `response` - `ResponseDetails` with state side effects and delay directives
//! - `matcher` - field matchers, request matchers and rules
//! - `pattern` - regexes compiled once per owning rule

mod matcher;
mod pattern;
mod request;
mod response;

pub use matcher::{
    constrained, constrained_map, ArrayConfig, FieldMatcher, MatcherKind, MatcherValue,
    RequestMatcher, RequestMatcherResponsePair,
};
pub use pattern::CompiledRegex;
pub use request::{parse_query, Fingerprint, RequestDetails, SimpleRequest, VALUE_SEPARATOR};
pub(crate) use request::decode_component;
pub use response::ResponseDetails;
