//! Live forwarding of requests to the real service.

use crate::error::{EngineError, Result};
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Sends a request to the real service and returns its response.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: &RequestDetails) -> Result<ResponseDetails>;
}

/// Headers that describe the inbound hop, not the request.
const HOP_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
];

/// `reqwest`-based forwarder.
///
/// In proxy deployment the target is `scheme://destination`; in
/// standalone-server deployment requests go to the configured upstream base.
/// Response bodies are not decompressed, so recorded and diffed bodies keep
/// their declared `Content-Encoding`.
#[derive(Debug, Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    upstream: Option<String>,
}

impl HttpForwarder {
    pub fn new(timeout: Duration, upstream: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::ForwardingFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            upstream: upstream.map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    /// Target URL for `request`.
    pub fn target_url(&self, request: &RequestDetails) -> String {
        let base = match &self.upstream {
            Some(upstream) => upstream.clone(),
            None => format!("{}://{}", request.scheme, request.destination),
        };
        let query = request.canonical_query();
        if query.is_empty() {
            format!("{base}{}", request.path)
        } else {
            format!("{base}{}?{query}", request.path)
        }
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: &RequestDetails) -> Result<ResponseDetails> {
        let url = self.target_url(request);
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| EngineError::ForwardingFailed(format!("invalid method: {e}")))?;

        debug!("Forwarding to: {} {}", request.method, url);
        let mut builder = self.client.request(method, &url);
        for (name, values) in &request.headers {
            if HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
                continue;
            }
            for value in values {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            warn!("Upstream request to {} failed: {}", url, e);
            EngineError::ForwardingFailed(e.to_string())
        })?;

        let status = response.status().as_u16();
        let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_default()
                    .push(value.to_string());
            }
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| EngineError::ForwardingFailed(format!("failed to read body: {e}")))?;

        debug!(
            status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "upstream responded"
        );
        Ok(ResponseDetails::from_live(status, headers, &body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestDetails {
        RequestDetails::new("GET", "https", "api.example.com", "/v1/items", Some("b=2&a=1"))
    }

    #[test]
    fn test_target_url_proxy() {
        let forwarder = HttpForwarder::new(Duration::from_secs(1), None).unwrap();
        assert_eq!(
            forwarder.target_url(&request()),
            "https://api.example.com/v1/items?a=1&b=2"
        );
    }

    #[test]
    fn test_target_url_upstream() {
        let forwarder =
            HttpForwarder::new(Duration::from_secs(1), Some("http://localhost:9000/".into()))
                .unwrap();
        let req = RequestDetails::new("GET", "http", "ignored", "/health", None);
        assert_eq!(forwarder.target_url(&req), "http://localhost:9000/health");
    }

    #[tokio::test]
    async fn test_invalid_method_fails() {
        let forwarder = HttpForwarder::new(Duration::from_secs(1), None).unwrap();
        let mut req = request();
        req.method = "BAD METHOD".to_string();
        assert!(matches!(
            forwarder.forward(&req).await,
            Err(EngineError::ForwardingFailed(_))
        ));
    }
}
