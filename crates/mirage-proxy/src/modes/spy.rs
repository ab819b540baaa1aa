use super::simulate::respond_with_match;
use super::{Mode, ModeHandler};
use crate::context::EngineContext;
use crate::error::{EngineError, Result};
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Simulates when a rule matches and passes through to the live service
/// otherwise.
pub struct SpyMode {
    context: Arc<EngineContext>,
}

impl SpyMode {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ModeHandler for SpyMode {
    fn mode(&self) -> Mode {
        Mode::Spy
    }

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails> {
        match self.context.find_match(&request, false) {
            Ok(matched) => respond_with_match(&self.context, request, matched).await,
            Err(EngineError::MatchingFailed(_)) => {
                debug!("no simulation for {}, passing through", request);
                self.context.forward(&request).await
            }
            Err(e) => Err(e),
        }
    }
}
