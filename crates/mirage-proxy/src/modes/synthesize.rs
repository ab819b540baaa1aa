use super::{Mode, ModeHandler};
use crate::context::EngineContext;
use crate::error::Result;
use crate::middleware::RequestResponsePair;
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::sync::Arc;

/// Builds every response with middleware. Never forwards.
pub struct SynthesizeMode {
    context: Arc<EngineContext>,
}

impl SynthesizeMode {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ModeHandler for SynthesizeMode {
    fn mode(&self) -> Mode {
        Mode::Synthesize
    }

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails> {
        let middleware = self.context.require_middleware()?;
        let pair = middleware
            .execute(RequestResponsePair::new(request, ResponseDetails::default()))
            .await?;
        Ok(pair.response)
    }
}
