//! Middleware: an external transform applied to a request/response pair.
//!
//! The engine only relies on the contract (pair in, pair or error out). The
//! bundled implementation runs an in-process Rhai script.

mod rhai_script;

pub use rhai_script::RhaiMiddleware;

use crate::error::Result;
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a middleware receives and returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponsePair {
    pub request: RequestDetails,
    #[serde(default)]
    pub response: ResponseDetails,
}

impl RequestResponsePair {
    pub fn new(request: RequestDetails, response: ResponseDetails) -> Self {
        Self { request, response }
    }
}

#[async_trait]
pub trait Middleware: Send + Sync {
    /// Label used in logs and failure reports.
    fn name(&self) -> &str;

    async fn execute(&self, pair: RequestResponsePair) -> Result<RequestResponsePair>;
}
