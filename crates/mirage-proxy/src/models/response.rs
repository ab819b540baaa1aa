//! Response definitions returned by rules and recorded from live traffic.

use crate::delay::LogNormalDelay;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A response as stored in a rule or produced by live forwarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDetails {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub body: String,
    /// Body is base64; used for non-text payloads and content-encoded bodies.
    #[serde(default, skip_serializing_if = "is_false")]
    pub encoded_body: bool,
    #[serde(default)]
    pub headers: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub templated: bool,
    /// Merged into process state after this response is used.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub transitions_state: BTreeMap<String, String>,
    /// Keys deleted from process state after this response is used.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removes_state: Vec<String>,
    /// Fixed delay in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_normal_delay: Option<LogNormalDelay>,
}

fn default_status() -> u16 {
    200
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Default for ResponseDetails {
    fn default() -> Self {
        Self {
            status: default_status(),
            body: String::new(),
            encoded_body: false,
            headers: BTreeMap::new(),
            templated: false,
            transitions_state: BTreeMap::new(),
            removes_state: Vec::new(),
            fixed_delay: None,
            log_normal_delay: None,
        }
    }
}

impl ResponseDetails {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// Build a response from live traffic. Bodies that are not UTF-8 or that
    /// declare a `Content-Encoding` are kept as base64.
    pub fn from_live(status: u16, headers: BTreeMap<String, Vec<String>>, body: &[u8]) -> Self {
        let content_encoded = headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case("content-encoding") && !v.is_empty());

        let (body, encoded_body) = match std::str::from_utf8(body) {
            Ok(text) if !content_encoded => (text.to_string(), false),
            _ => (BASE64.encode(body), true),
        };

        Self {
            status,
            body,
            encoded_body,
            headers,
            ..Default::default()
        }
    }

    /// Raw body bytes, decoding base64 when the body is stored encoded.
    pub fn body_bytes(&self) -> Vec<u8> {
        if self.encoded_body {
            match BASE64.decode(self.body.as_bytes()) {
                Ok(bytes) => bytes,
                Err(_) => self.body.as_bytes().to_vec(),
            }
        } else {
            self.body.as_bytes().to_vec()
        }
    }

    /// Header values by case-insensitive name.
    pub fn header_values(&self, name: &str) -> Option<&[String]> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    /// Whether this response changes process state when used.
    pub fn affects_state(&self) -> bool {
        !self.transitions_state.is_empty() || !self.removes_state.is_empty()
    }
}
