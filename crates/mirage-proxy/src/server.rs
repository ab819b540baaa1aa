//! Plain HTTP/1.1 listener in front of the engine.
//!
//! Every inbound request becomes a [`RequestDetails`], is resolved by
//! [`Engine::process`], and the resulting [`ResponseDetails`] is written back.

use crate::engine::Engine;
use crate::metrics;
use crate::models::{RequestDetails, ResponseDetails};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::str::Utf8Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Headers recomputed by the transport for every written response.
const TRANSPORT_HEADERS: &[&str] = &["content-length", "transfer-encoding", "connection"];

pub struct MirageServer {
    addr: SocketAddr,
    engine: Arc<Engine>,
}

impl MirageServer {
    pub fn new(addr: SocketAddr, engine: Arc<Engine>) -> Self {
        Self { addr, engine }
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(
            "Mirage listening on http://{} (mode: {})",
            self.addr,
            self.engine.mode()
        );

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let engine = Arc::clone(&self.engine);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let engine = Arc::clone(&engine);
                    async move { handle(req, engine).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("connection error: {}", e);
                }
            });
        }
    }
}

async fn handle(
    req: Request<Incoming>,
    engine: Arc<Engine>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("failed to read request body: {}", e);
            return Ok(plain_response(StatusCode::BAD_REQUEST, "failed to read request body"));
        }
    };

    let request = match request_details(&parts, &body) {
        Ok(request) => request,
        Err(e) => {
            warn!(method = %parts.method, path = parts.uri.path(), "rejecting request body: {}", e);
            return Ok(plain_response(StatusCode::BAD_REQUEST, "request body is not valid UTF-8"));
        }
    };
    let response = engine.process(request).await;
    Ok(into_hyper_response(&response))
}

/// Convert inbound request parts into the engine's request model. Scheme and
/// destination come from an absolute URI when the client sent one (proxy
/// form), otherwise from the `Host` header.
///
/// Request bodies are text; a body that is not valid UTF-8 is an error rather
/// than being replaced lossily.
pub fn request_details(
    parts: &hyper::http::request::Parts,
    body: &[u8],
) -> Result<RequestDetails, Utf8Error> {
    let body = std::str::from_utf8(body)?;
    let uri = &parts.uri;
    let scheme = uri.scheme_str().unwrap_or("http");
    let destination = match uri.authority() {
        Some(authority) => authority.as_str().to_string(),
        None => parts
            .headers
            .get(HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    };

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &parts.headers {
        if let Ok(value) = value.to_str() {
            headers
                .entry(canonical_header_name(name.as_str()))
                .or_default()
                .push(value.to_string());
        }
    }

    let mut request = RequestDetails::new(
        parts.method.as_str(),
        scheme,
        &destination,
        uri.path(),
        uri.query(),
    )
    .with_body(body);
    request.headers = headers;
    Ok(request)
}

/// `content-type` -> `Content-Type`.
fn canonical_header_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Convert an engine response into a hyper response.
pub fn into_hyper_response(response: &ResponseDetails) -> Response<Full<Bytes>> {
    let status = match StatusCode::from_u16(response.status) {
        Ok(status) => status,
        Err(_) => {
            warn!(status = response.status, "invalid response status");
            return plain_response(StatusCode::BAD_GATEWAY, "invalid response status");
        }
    };

    let mut out = Response::new(Full::new(Bytes::from(response.body_bytes())));
    *out.status_mut() = status;
    for (name, values) in &response.headers {
        if TRANSPORT_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            continue;
        }
        let Ok(header) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!("skipping invalid header name {}", name);
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::from_str(value) {
                out.headers_mut().append(header.clone(), value);
            }
        }
    }
    out
}

fn plain_response(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(Bytes::from(message.to_string())));
    *out.status_mut() = status;
    out.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    out
}

/// Serves the Prometheus text exposition on every path.
pub struct MetricsServer {
    addr: SocketAddr,
}

impl MetricsServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn run(self) -> Result<(), anyhow::Error> {
        let listener = TcpListener::bind(self.addr).await?;
        info!("Metrics listening on http://{}/metrics", self.addr);

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            tokio::spawn(async move {
                let service = service_fn(|_req: Request<Incoming>| async {
                    let mut out = Response::new(Full::new(Bytes::from(metrics::collect_metrics())));
                    out.headers_mut().insert(
                        CONTENT_TYPE,
                        HeaderValue::from_static("text/plain; version=0.0.4"),
                    );
                    Ok::<_, Infallible>(out)
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("metrics connection error: {}", e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(builder: hyper::http::request::Builder) -> hyper::http::request::Parts {
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_request_details_origin_form() {
        let parts = parts(
            Request::builder()
                .method("POST")
                .uri("/users?b=2&a=1")
                .header("host", "api.example.com")
                .header("x-request-id", "abc"),
        );
        let request = request_details(&parts, b"{\"id\":1}").unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.scheme, "http");
        assert_eq!(request.destination, "api.example.com");
        assert_eq!(request.path, "/users");
        assert_eq!(request.canonical_query(), "a=1&b=2");
        assert_eq!(request.body, "{\"id\":1}");
        assert_eq!(request.header("X-Request-Id"), Some("abc"));
        assert!(request.headers.contains_key("X-Request-Id"));
    }

    #[test]
    fn test_request_details_absolute_form() {
        let parts = parts(Request::builder().uri("https://secure.example.com:8443/x"));
        let request = request_details(&parts, b"").unwrap();
        assert_eq!(request.scheme, "https");
        assert_eq!(request.destination, "secure.example.com:8443");
        assert_eq!(request.path, "/x");
    }

    #[test]
    fn test_request_details_rejects_binary_body() {
        let parts = parts(Request::builder().method("PUT").uri("/upload"));
        assert!(request_details(&parts, &[0xff, 0xfe, 0x00, 0x81]).is_err());
        let request = request_details(&parts, "héllo".as_bytes()).unwrap();
        assert_eq!(request.body, "héllo");
    }

    #[test]
    fn test_into_hyper_response() {
        let response = ResponseDetails::new(201, "created")
            .with_header("X-Id", "7")
            .with_header("Content-Length", "999");
        let out = into_hyper_response(&response);
        assert_eq!(out.status(), StatusCode::CREATED);
        assert_eq!(out.headers().get("x-id").unwrap(), "7");
        assert!(out.headers().get("content-length").is_none());
    }

    #[test]
    fn test_invalid_status_becomes_bad_gateway() {
        let out = into_hyper_response(&ResponseDetails::new(1000, ""));
        assert_eq!(out.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_canonical_header_name() {
        assert_eq!(canonical_header_name("content-type"), "Content-Type");
        assert_eq!(canonical_header_name("x-request-id"), "X-Request-Id");
    }
}
