//! Request identity: the details the engine matches on and the fingerprints
//! derived from them.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Separator used when a multi-valued query parameter or header is presented
/// to a field matcher as a single string.
pub const VALUE_SEPARATOR: &str = ";";

/// An inbound request, reduced to the fields the engine matches on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    pub method: String,
    pub scheme: String,
    pub destination: String,
    pub path: String,
    #[serde(default)]
    pub query: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
}

impl RequestDetails {
    /// Create request details; the method is normalized to upper case.
    pub fn new(
        method: &str,
        scheme: &str,
        destination: &str,
        path: &str,
        raw_query: Option<&str>,
    ) -> Self {
        Self {
            method: method.to_uppercase(),
            scheme: scheme.to_lowercase(),
            destination: destination.to_string(),
            path: if path.is_empty() {
                "/".to_string()
            } else {
                path.to_string()
            },
            query: parse_query(raw_query),
            body: String::new(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// Header values by case-insensitive name.
    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// First header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Values of one query parameter, sorted and joined for matching.
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query.get(key).map(|values| join_sorted(values))
    }

    /// Header values joined for matching (request order preserved).
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.header_values(name)
            .map(|values| values.join(VALUE_SEPARATOR))
    }

    /// Canonical query string: keys sorted (the map is ordered), values sorted,
    /// so that parameter order in the original URL is irrelevant.
    pub fn canonical_query(&self) -> String {
        let mut pairs = Vec::new();
        for (key, values) in &self.query {
            let mut sorted: Vec<&String> = values.iter().collect();
            sorted.sort();
            if sorted.is_empty() {
                pairs.push(urlencoding::encode(key).into_owned());
            }
            for value in sorted {
                pairs.push(format!(
                    "{}={}",
                    urlencoding::encode(key),
                    urlencoding::encode(value)
                ));
            }
        }
        pairs.join("&")
    }

    /// Fingerprint of the identity-bearing fields. The destination is included
    /// in proxy deployment and excluded in standalone-server deployment.
    pub fn fingerprint(&self, include_destination: bool) -> Fingerprint {
        let mut hasher = DefaultHasher::new();
        self.method.hash(&mut hasher);
        self.scheme.hash(&mut hasher);
        if include_destination {
            self.destination.hash(&mut hasher);
        }
        self.path.hash(&mut hasher);
        self.canonical_query().hash(&mut hasher);
        self.body.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }

    /// Simplified identity used to key diff reports.
    pub fn simple(&self) -> SimpleRequest {
        SimpleRequest {
            method: self.method.clone(),
            host: self.destination.clone(),
            path: self.path.clone(),
            query: self.canonical_query(),
        }
    }
}

impl fmt::Display for RequestDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}://{}{}", self.method, self.scheme, self.destination, self.path)?;
        let query = self.canonical_query();
        if !query.is_empty() {
            write!(f, "?{query}")?;
        }
        Ok(())
    }
}

/// Digest of a request's identity-bearing fields, used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Method, host, path and canonical query of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimpleRequest {
    pub method: String,
    pub host: String,
    pub path: String,
    pub query: String,
}

/// Parse a raw query string into a key -> values map.
pub fn parse_query(raw: Option<&str>) -> BTreeMap<String, Vec<String>> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let Some(raw) = raw else {
        return params;
    };
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(key);
        let value = decode_component(value);
        params.entry(key).or_default().push(value);
    }
    params
}

/// Decode one `application/x-www-form-urlencoded` component.
pub(crate) fn decode_component(raw: &str) -> String {
    let plus_decoded = raw.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(|s| s.into_owned())
        .unwrap_or(plus_decoded)
}

fn join_sorted(values: &[String]) -> String {
    let mut sorted: Vec<&str> = values.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(VALUE_SEPARATOR)
}
