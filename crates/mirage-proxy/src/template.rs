//! Response body templating.
//!
//! Templated responses (`"templated": true`) may reference the request and
//! the process state. A template is compiled once into segments; simulate
//! mode memoizes the compiled form on the cache entry.
//!
//! # Supported Template Variables
//!
//! - `{{ Request.Method }}`, `{{ Request.Scheme }}`, `{{ Request.Path }}`
//! - `{{ Request.Path.[n] }}` - n-th non-empty path segment (0-based)
//! - `{{ Request.QueryParam.<name> }}` - query values, separator-joined
//! - `{{ Request.Header.<name> }}` - header values (case-insensitive name)
//! - `{{ Request.Body }}` - the raw request body
//! - `{{ State.<key> }}` - a process state value
//!
//! Variables without a value render as the empty string.

use crate::error::{EngineError, Result};
use crate::models::RequestDetails;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Regex for matching template expressions: {{ Request.Path }}, {{ State.key }}, etc.
static TEMPLATE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_template_regex() -> &'static Regex {
    TEMPLATE_REGEX.get_or_init(|| Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Variable {
    Method,
    Scheme,
    Path,
    PathSegment(usize),
    QueryParam(String),
    Header(String),
    Body,
    State(String),
}

impl Variable {
    fn parse(expr: &str) -> Result<Self> {
        let unknown = || EngineError::Template(format!("unknown template expression '{expr}'"));

        if let Some(key) = expr.strip_prefix("State.") {
            return Ok(Variable::State(key.to_string()));
        }
        let rest = expr.strip_prefix("Request.").ok_or_else(unknown)?;
        match rest {
            "Method" => Ok(Variable::Method),
            "Scheme" => Ok(Variable::Scheme),
            "Path" => Ok(Variable::Path),
            "Body" => Ok(Variable::Body),
            _ => {
                if let Some(index) = rest
                    .strip_prefix("Path.[")
                    .and_then(|s| s.strip_suffix(']'))
                {
                    let index = index.trim().parse().map_err(|_| unknown())?;
                    return Ok(Variable::PathSegment(index));
                }
                if let Some(name) = rest.strip_prefix("QueryParam.") {
                    return Ok(Variable::QueryParam(name.to_string()));
                }
                if let Some(name) = rest.strip_prefix("Header.") {
                    return Ok(Variable::Header(name.to_string()));
                }
                Err(unknown())
            }
        }
    }

    fn resolve(&self, request: &RequestDetails, state: &HashMap<String, String>) -> String {
        match self {
            Variable::Method => request.method.clone(),
            Variable::Scheme => request.scheme.clone(),
            Variable::Path => request.path.clone(),
            Variable::PathSegment(n) => request
                .path
                .split('/')
                .filter(|s| !s.is_empty())
                .nth(*n)
                .unwrap_or_default()
                .to_string(),
            Variable::QueryParam(name) => request.query_value(name).unwrap_or_default(),
            Variable::Header(name) => request.header_value(name).unwrap_or_default(),
            Variable::Body => request.body.clone(),
            Variable::State(key) => state.get(key).cloned().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(Variable),
}

/// A template split into literal text and variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
}

impl CompiledTemplate {
    pub fn compile(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in get_template_regex().captures_iter(template) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Literal(template[last..whole.start()].to_string()));
            }
            let expr = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            segments.push(Segment::Variable(Variable::parse(expr)?));
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Literal(template[last..].to_string()));
        }
        Ok(Self { segments })
    }

    pub fn render(&self, request: &RequestDetails, state: &HashMap<String, String>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Variable(var) => out.push_str(&var.resolve(request, state)),
            }
        }
        out
    }

    pub fn has_variables(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Variable(_)))
    }
}

/// Renders templated response bodies.
pub trait Templator: Send + Sync {
    fn compile(&self, template: &str) -> Result<CompiledTemplate>;

    fn render(
        &self,
        template: &CompiledTemplate,
        request: &RequestDetails,
        state: &HashMap<String, String>,
    ) -> Result<String>;
}

/// The built-in templator.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTemplator;

impl Templator for DefaultTemplator {
    fn compile(&self, template: &str) -> Result<CompiledTemplate> {
        CompiledTemplate::compile(template)
    }

    fn render(
        &self,
        template: &CompiledTemplate,
        request: &RequestDetails,
        state: &HashMap<String, String>,
    ) -> Result<String> {
        Ok(template.render(request, state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestDetails {
        RequestDetails::new(
            "POST",
            "https",
            "api.example.com",
            "/users/42/orders",
            Some("page=2&tag=b&tag=a"),
        )
        .with_header("X-Request-Id", "abc")
        .with_body(r#"{"id": 1}"#)
    }

    #[test]
    fn test_request_variables() {
        let t = CompiledTemplate::compile(
            "{{ Request.Method }} {{Request.Scheme}} {{ Request.Path }} {{ Request.Path.[1] }}",
        )
        .unwrap();
        assert_eq!(
            t.render(&request(), &HashMap::new()),
            "POST https /users/42/orders 42"
        );
    }

    #[test]
    fn test_query_header_body() {
        let t = CompiledTemplate::compile(
            "page={{ Request.QueryParam.page }} tags={{ Request.QueryParam.tag }} id={{ Request.Header.x-request-id }} body={{ Request.Body }}",
        )
        .unwrap();
        assert_eq!(
            t.render(&request(), &HashMap::new()),
            r#"page=2 tags=a;b id=abc body={"id": 1}"#
        );
    }

    #[test]
    fn test_state_and_missing_values() {
        let t = CompiledTemplate::compile("{{ State.eggs }}|{{ State.none }}|{{ Request.Path.[9] }}")
            .unwrap();
        let mut state = HashMap::new();
        state.insert("eggs".to_string(), "present".to_string());
        assert_eq!(t.render(&request(), &state), "present||");
    }

    #[test]
    fn test_unknown_expression_rejected() {
        assert!(matches!(
            CompiledTemplate::compile("{{ Request.Cookie.x }}"),
            Err(EngineError::Template(_))
        ));
        assert!(CompiledTemplate::compile("{{ now }}").is_err());
    }

    #[test]
    fn test_plain_text() {
        let t = CompiledTemplate::compile("no variables here").unwrap();
        assert!(!t.has_variables());
        assert_eq!(t.render(&request(), &HashMap::new()), "no variables here");
    }

    #[test]
    fn test_default_templator() {
        let templator = DefaultTemplator;
        let compiled = templator.compile("{{ Request.Method }}").unwrap();
        assert_eq!(
            templator.render(&compiled, &request(), &HashMap::new()).unwrap(),
            "POST"
        );
    }
}
