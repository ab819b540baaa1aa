use super::{Mode, ModeHandler};
use crate::context::EngineContext;
use crate::error::Result;
use crate::middleware::RequestResponsePair;
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::sync::Arc;

/// Forwards live, passing the request and then the response through
/// middleware.
pub struct ModifyMode {
    context: Arc<EngineContext>,
}

impl ModifyMode {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ModeHandler for ModifyMode {
    fn mode(&self) -> Mode {
        Mode::Modify
    }

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails> {
        let middleware = self.context.require_middleware()?;
        let outbound = middleware
            .execute(RequestResponsePair::new(request, ResponseDetails::default()))
            .await?;

        let live = self.context.forward(&outbound.request).await?;
        let inbound = middleware
            .execute(RequestResponsePair::new(outbound.request, live))
            .await?;
        Ok(inbound.response)
    }
}
