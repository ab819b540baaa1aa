//! Stub collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use mirage_proxy::delay::{Delay, Delayer};
use mirage_proxy::forwarding::Forwarder;
use mirage_proxy::middleware::{Middleware, RequestResponsePair};
use mirage_proxy::models::{RequestDetails, ResponseDetails};
use mirage_proxy::{Engine, EngineError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Answers live requests from a script of responses, repeating the last one.
pub struct StubForwarder {
    responses: Vec<ResponseDetails>,
    calls: AtomicUsize,
    pub received: Mutex<Vec<RequestDetails>>,
}

impl StubForwarder {
    pub fn new(responses: Vec<ResponseDetails>) -> Arc<Self> {
        Arc::new(Self {
            responses,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        })
    }

    pub fn body(body: &str) -> Arc<Self> {
        Self::new(vec![ResponseDetails::new(200, body)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forwarder for StubForwarder {
    async fn forward(&self, request: &RequestDetails) -> Result<ResponseDetails> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().push(request.clone());
        match self.responses.get(n).or_else(|| self.responses.last()) {
            Some(response) => Ok(response.clone()),
            None => Err(EngineError::ForwardingFailed("no live service".into())),
        }
    }
}

/// Records every delay instead of sleeping.
#[derive(Default)]
pub struct CountingDelayer {
    pub delays: Mutex<Vec<Delay>>,
}

impl CountingDelayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.delays.lock().len()
    }
}

#[async_trait]
impl Delayer for CountingDelayer {
    async fn delay(&self, delay: Delay) {
        self.delays.lock().push(delay);
    }
}

type Transform = dyn Fn(RequestResponsePair) -> Result<RequestResponsePair> + Send + Sync;

/// Middleware backed by a closure.
pub struct FnMiddleware {
    transform: Box<Transform>,
    calls: AtomicUsize,
}

impl FnMiddleware {
    pub fn new<F>(transform: F) -> Arc<Self>
    where
        F: Fn(RequestResponsePair) -> Result<RequestResponsePair> + Send + Sync + 'static,
    {
        Arc::new(Self {
            transform: Box::new(transform),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Middleware for FnMiddleware {
    fn name(&self) -> &str {
        "stub"
    }

    async fn execute(&self, pair: RequestResponsePair) -> Result<RequestResponsePair> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.transform)(pair)
    }
}

pub fn get(path: &str) -> RequestDetails {
    RequestDetails::new("GET", "http", "api.example.com", path, None)
}

pub fn engine_with(forwarder: Arc<StubForwarder>, delayer: Arc<CountingDelayer>) -> Engine {
    Engine::builder()
        .forwarder(forwarder)
        .delayer(delayer)
        .build()
        .unwrap()
}
