//! Declarative request matchers and the rule type pairing them with a response.
//!
//! A [`FieldMatcher`] is decided at parse time: its `value` is one of
//! [`MatcherValue::Scalar`], [`MatcherValue::List`] (array matcher) or
//! [`MatcherValue::NestedFields`] (form matcher). Nothing inspects the raw JSON
//! shape at match time.

use super::pattern::CompiledRegex;
use super::response::ResponseDetails;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of comparison a field matcher performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Exact,
    Glob,
    Regex,
    Json,
    Xml,
    Array,
    Form,
    JsonPath,
    XPath,
    Negate,
}

impl MatcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatcherKind::Exact => "exact",
            MatcherKind::Glob => "glob",
            MatcherKind::Regex => "regex",
            MatcherKind::Json => "json",
            MatcherKind::Xml => "xml",
            MatcherKind::Array => "array",
            MatcherKind::Form => "form",
            MatcherKind::JsonPath => "jsonpath",
            MatcherKind::XPath => "xpath",
            MatcherKind::Negate => "negate",
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatcherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(MatcherKind::Exact),
            "glob" => Ok(MatcherKind::Glob),
            "regex" => Ok(MatcherKind::Regex),
            "json" => Ok(MatcherKind::Json),
            "xml" => Ok(MatcherKind::Xml),
            "array" => Ok(MatcherKind::Array),
            "form" => Ok(MatcherKind::Form),
            "jsonpath" => Ok(MatcherKind::JsonPath),
            "xpath" => Ok(MatcherKind::XPath),
            "negate" => Ok(MatcherKind::Negate),
            other => Err(format!("unknown matcher kind '{other}'")),
        }
    }
}

/// Matcher value, shaped by the matcher kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherValue {
    Scalar(String),
    List(Vec<String>),
    NestedFields(BTreeMap<String, Vec<FieldMatcher>>),
}

/// Options for the array matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayConfig {
    /// Request values absent from the matcher list are tolerated.
    #[serde(default)]
    pub ignore_unknown: bool,
    #[serde(default = "default_true")]
    pub ignore_order: bool,
    /// Duplicate request values are tolerated.
    #[serde(default)]
    pub ignore_occurrences: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            ignore_unknown: false,
            ignore_order: true,
            ignore_occurrences: false,
        }
    }
}

/// One matcher applied to one field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FieldMatcherRaw", into = "FieldMatcherRaw")]
pub struct FieldMatcher {
    pub kind: MatcherKind,
    pub value: MatcherValue,
    pub config: Option<ArrayConfig>,
    /// Chained matcher, applied after this one matches.
    pub do_match: Option<Box<FieldMatcher>>,
    /// Compiled pattern of a `regex` matcher.
    pub(crate) compiled: CompiledRegex,
}

impl FieldMatcher {
    fn scalar(kind: MatcherKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: MatcherValue::Scalar(value.into()),
            config: None,
            do_match: None,
            compiled: CompiledRegex::default(),
        }
    }

    pub fn exact(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::Exact, value)
    }

    pub fn glob(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::Glob, value)
    }

    pub fn regex(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::Regex, value)
    }

    pub fn json(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::Json, value)
    }

    pub fn xml(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::Xml, value)
    }

    pub fn json_path(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::JsonPath, value)
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::XPath, value)
    }

    pub fn negate(value: impl Into<String>) -> Self {
        Self::scalar(MatcherKind::Negate, value)
    }

    pub fn array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: MatcherKind::Array,
            value: MatcherValue::List(values.into_iter().map(Into::into).collect()),
            config: None,
            do_match: None,
            compiled: CompiledRegex::default(),
        }
    }

    pub fn form(fields: BTreeMap<String, Vec<FieldMatcher>>) -> Self {
        Self {
            kind: MatcherKind::Form,
            value: MatcherValue::NestedFields(fields),
            config: None,
            do_match: None,
            compiled: CompiledRegex::default(),
        }
    }

    pub fn with_config(mut self, config: ArrayConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Chain `next` after this matcher.
    pub fn then(mut self, next: FieldMatcher) -> Self {
        self.do_match = Some(Box::new(next));
        self
    }

    /// Scalar value, or the empty string for list/nested values.
    pub fn scalar_value(&self) -> &str {
        match &self.value {
            MatcherValue::Scalar(s) => s,
            _ => "",
        }
    }

    /// Whether a `regex` matcher's pattern matches `value`.
    pub(crate) fn regex_matches(&self, value: &str) -> bool {
        self.compiled.is_match(self.scalar_value(), value)
    }

    fn is_plain_exact(&self) -> bool {
        self.kind == MatcherKind::Exact && self.do_match.is_none()
    }
}

/// Wire shape of a field matcher: `{"matcher": "...", "value": ..., "config": ..., "doMatch": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FieldMatcherRaw {
    matcher: String,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    config: Option<ArrayConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    do_match: Option<Box<FieldMatcherRaw>>,
}

impl TryFrom<FieldMatcherRaw> for FieldMatcher {
    type Error = String;

    fn try_from(raw: FieldMatcherRaw) -> Result<Self, Self::Error> {
        use serde_json::Value;

        let kind: MatcherKind = raw.matcher.parse()?;
        let value = match kind {
            MatcherKind::Array => match raw.value {
                Value::Array(items) => MatcherValue::List(items.iter().map(json_scalar).collect()),
                Value::Null => MatcherValue::List(Vec::new()),
                other => MatcherValue::List(vec![json_scalar(&other)]),
            },
            MatcherKind::Form => {
                let Value::Object(fields) = raw.value else {
                    return Err("form matcher value must be an object of field matchers".into());
                };
                let mut nested = BTreeMap::new();
                for (name, matchers) in fields {
                    let matchers: Vec<FieldMatcher> = serde_json::from_value(matchers)
                        .map_err(|e| format!("form field '{name}': {e}"))?;
                    nested.insert(name, matchers);
                }
                MatcherValue::NestedFields(nested)
            }
            _ => MatcherValue::Scalar(json_scalar(&raw.value)),
        };

        if kind == MatcherKind::Regex {
            if let MatcherValue::Scalar(pattern) = &value {
                Regex::new(pattern).map_err(|e| format!("invalid regex '{pattern}': {e}"))?;
            }
        }

        let do_match = match raw.do_match {
            Some(next) => Some(Box::new(FieldMatcher::try_from(*next)?)),
            None => None,
        };

        Ok(FieldMatcher {
            kind,
            value,
            config: raw.config,
            do_match,
            compiled: CompiledRegex::default(),
        })
    }
}

impl From<FieldMatcher> for FieldMatcherRaw {
    fn from(matcher: FieldMatcher) -> Self {
        use serde_json::Value;

        let value = match matcher.value {
            MatcherValue::Scalar(s) => Value::String(s),
            MatcherValue::List(items) => Value::Array(items.into_iter().map(Value::String).collect()),
            MatcherValue::NestedFields(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(name, matchers)| {
                        let raw: Vec<FieldMatcherRaw> =
                            matchers.into_iter().map(FieldMatcherRaw::from).collect();
                        (name, serde_json::to_value(raw).unwrap_or(Value::Null))
                    })
                    .collect(),
            ),
        };

        FieldMatcherRaw {
            matcher: matcher.kind.as_str().to_string(),
            value,
            config: matcher.config,
            do_match: matcher.do_match.map(|next| Box::new(FieldMatcherRaw::from(*next))),
        }
    }
}

fn json_scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Per-field matchers for one rule. `None` (or an empty list/map) means the
/// field is a wildcard and matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcher {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<FieldMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Vec<FieldMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Vec<FieldMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<Vec<FieldMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<FieldMatcher>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Vec<FieldMatcher>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Vec<FieldMatcher>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_state: Option<BTreeMap<String, String>>,
}

/// Constrained matchers of a scalar field, `None` when the field is a wildcard.
pub fn constrained(field: &Option<Vec<FieldMatcher>>) -> Option<&[FieldMatcher]> {
    field.as_deref().filter(|m| !m.is_empty())
}

/// Constrained entries of a keyed field, `None` when the field is a wildcard.
pub fn constrained_map(
    field: &Option<BTreeMap<String, Vec<FieldMatcher>>>,
) -> Option<&BTreeMap<String, Vec<FieldMatcher>>> {
    field.as_ref().filter(|m| !m.is_empty())
}

impl RequestMatcher {
    pub fn with_path(mut self, matcher: FieldMatcher) -> Self {
        self.path.get_or_insert_with(Vec::new).push(matcher);
        self
    }

    pub fn with_method(mut self, matcher: FieldMatcher) -> Self {
        self.method.get_or_insert_with(Vec::new).push(matcher);
        self
    }

    pub fn with_destination(mut self, matcher: FieldMatcher) -> Self {
        self.destination.get_or_insert_with(Vec::new).push(matcher);
        self
    }

    pub fn with_scheme(mut self, matcher: FieldMatcher) -> Self {
        self.scheme.get_or_insert_with(Vec::new).push(matcher);
        self
    }

    pub fn with_body(mut self, matcher: FieldMatcher) -> Self {
        self.body.get_or_insert_with(Vec::new).push(matcher);
        self
    }

    pub fn with_query(mut self, key: &str, matcher: FieldMatcher) -> Self {
        self.query
            .get_or_insert_with(BTreeMap::new)
            .entry(key.to_string())
            .or_default()
            .push(matcher);
        self
    }

    pub fn with_header(mut self, name: &str, matcher: FieldMatcher) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .entry(name.to_string())
            .or_default()
            .push(matcher);
        self
    }

    pub fn with_required_state(mut self, key: &str, value: &str) -> Self {
        self.requires_state
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Required state entries, empty when the rule is stateless.
    pub fn required_state(&self) -> impl Iterator<Item = (&String, &String)> {
        self.requires_state.iter().flat_map(|m| m.iter())
    }

    /// True when the rule's outcome depends on something a fingerprint cannot
    /// see: header matchers or a state precondition.
    pub fn is_volatile(&self) -> bool {
        constrained_map(&self.headers).is_some()
            || self.requires_state.as_ref().is_some_and(|s| !s.is_empty())
    }

    /// True when the rule constrains the destination, so its outcome differs
    /// between proxy and standalone-server deployment.
    pub fn constrains_destination(&self) -> bool {
        constrained(&self.destination).is_some()
    }

    /// A rule is eagerly cacheable when each of path, method, destination,
    /// scheme, query and body is either unconstrained or a single plain `exact`
    /// matcher, there are no header matchers and no state precondition.
    pub fn is_eagerly_cacheable(&self) -> bool {
        if self.is_volatile() {
            return false;
        }

        let scalar_ok = [
            &self.path,
            &self.method,
            &self.destination,
            &self.scheme,
            &self.body,
        ]
        .into_iter()
        .all(|field| match constrained(field) {
            None => true,
            Some([only]) => only.is_plain_exact(),
            Some(_) => false,
        });

        let query_ok = match constrained_map(&self.query) {
            None => true,
            Some(entries) => entries
                .values()
                .all(|m| matches!(m.as_slice(), [only] if only.is_plain_exact())),
        };

        scalar_ok && query_ok
    }
}

/// One rule: a request matcher and the response it yields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMatcherResponsePair {
    pub request_matcher: RequestMatcher,
    pub response: ResponseDetails,
}

impl RequestMatcherResponsePair {
    pub fn new(request_matcher: RequestMatcher, response: ResponseDetails) -> Self {
        Self {
            request_matcher,
            response,
        }
    }
}
