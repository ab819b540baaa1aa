//! Rule selection strategies and failure diagnostics.

use super::request::{evaluate_rule, RuleEvaluation};
use crate::models::{RequestDetails, RequestMatcher, RequestMatcherResponsePair, ResponseDetails};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How a winner is chosen among fully-matching rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// First matching rule in store order.
    First,
    /// Highest score; ties go to the earlier rule.
    #[default]
    Strongest,
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchingStrategy::First => f.write_str("first"),
            MatchingStrategy::Strongest => f.write_str("strongest"),
        }
    }
}

impl FromStr for MatchingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(MatchingStrategy::First),
            "strongest" => Ok(MatchingStrategy::Strongest),
            other => Err(format!("unknown matching strategy '{other}'")),
        }
    }
}

/// The best non-matching rule of a failed match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosestMiss {
    pub request_matcher: RequestMatcher,
    /// The response the rule would have returned.
    pub response: ResponseDetails,
    pub missed_fields: Vec<String>,
}

/// Outcome of one matcher run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub pair: Option<RequestMatcherResponsePair>,
    pub closest_miss: Option<ClosestMiss>,
    /// Safe to memoize under the request fingerprint.
    pub cacheable: bool,
}

/// Search `pairs` (in store order) for the rule answering `request`.
///
/// `state` is the snapshot used for the whole evaluation. Only rules whose
/// `requiresState` is satisfied are candidates, both for matching and for the
/// closest miss.
///
/// The result is marked cacheable only when the fingerprint alone determines
/// it: the winner (or the closest miss) must be eagerly cacheable and no rule
/// depending on headers or state may have matched every fingerprint-visible
/// field, since such a rule could win for another request with the same
/// fingerprint.
pub fn match_request(
    strategy: MatchingStrategy,
    request: &RequestDetails,
    pairs: &[RequestMatcherResponsePair],
    state: &HashMap<String, String>,
    webserver: bool,
) -> MatchResult {
    let mut winner: Option<(usize, usize)> = None;
    let mut closest: Option<(usize, RuleEvaluation)> = None;
    let mut shadowed = false;

    for (index, pair) in pairs.iter().enumerate() {
        let eval = evaluate_rule(&pair.request_matcher, request, state, webserver);

        if eval.is_match() {
            if winner.map_or(true, |(_, best)| eval.score > best) {
                winner = Some((index, eval.score));
            }
            if strategy == MatchingStrategy::First {
                break;
            }
            continue;
        }

        if pair.request_matcher.is_volatile() && eval.fingerprint_fields_matched {
            shadowed = true;
        }

        if eval.state_satisfied
            && closest
                .as_ref()
                .map_or(true, |(_, best)| eval.missed_fields.len() < best.missed_fields.len())
        {
            closest = Some((index, eval));
        }
    }

    if let Some((index, score)) = winner {
        let pair = pairs[index].clone();
        let cacheable = !shadowed && pair.request_matcher.is_eagerly_cacheable();
        debug!(rule = index, score, cacheable, "request matched");
        return MatchResult {
            pair: Some(pair),
            closest_miss: None,
            cacheable,
        };
    }

    let closest_miss = closest.map(|(index, eval)| ClosestMiss {
        request_matcher: pairs[index].request_matcher.clone(),
        response: pairs[index].response.clone(),
        missed_fields: eval.missed_fields,
    });
    let cacheable = !shadowed
        && closest_miss
            .as_ref()
            .is_some_and(|miss| miss.request_matcher.is_eagerly_cacheable());
    debug!(
        closest = closest_miss.is_some(),
        cacheable, "request did not match any rule"
    );

    MatchResult {
        pair: None,
        closest_miss,
        cacheable,
    }
}

/// Everything an operator needs to understand an unmatched request.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchingFailure {
    pub request: RequestDetails,
    pub state: BTreeMap<String, String>,
    pub closest_miss: Option<ClosestMiss>,
}

impl MatchingFailure {
    pub fn new(
        request: &RequestDetails,
        state: &HashMap<String, String>,
        closest_miss: Option<ClosestMiss>,
    ) -> Self {
        Self {
            request: request.clone(),
            state: state.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            closest_miss,
        }
    }
}

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("<unprintable: {e}>"))
}

impl fmt::Display for MatchingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "no simulation matched {}", self.request)?;
        writeln!(f)?;
        writeln!(f, "Request:")?;
        writeln!(f, "{}", pretty(&self.request))?;
        writeln!(f)?;
        writeln!(f, "State:")?;
        writeln!(f, "{}", pretty(&self.state))?;

        match &self.closest_miss {
            Some(miss) => {
                writeln!(f)?;
                writeln!(f, "Closest matcher:")?;
                writeln!(f, "{}", pretty(&miss.request_matcher))?;
                writeln!(f)?;
                writeln!(f, "Missed fields: [{}]", miss.missed_fields.join(", "))?;
                writeln!(f)?;
                writeln!(f, "It would have returned:")?;
                write!(f, "{}", pretty(&miss.response))
            }
            None => write!(f, "\nNo candidate rule was close."),
        }
    }
}
