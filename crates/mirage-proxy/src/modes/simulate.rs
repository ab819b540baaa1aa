use super::{Mode, ModeHandler};
use crate::context::{EngineContext, MatchedPair};
use crate::error::Result;
use crate::middleware::RequestResponsePair;
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Answers every request from the simulation store.
pub struct SimulateMode {
    context: Arc<EngineContext>,
}

impl SimulateMode {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl ModeHandler for SimulateMode {
    fn mode(&self) -> Mode {
        Mode::Simulate
    }

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails> {
        let matched = self.context.find_match(&request, false)?;
        respond_with_match(&self.context, request, matched).await
    }
}

/// Build the response of a successful match: render, run middleware, then
/// apply the rule's state effects and delay.
pub(super) async fn respond_with_match(
    context: &EngineContext,
    request: RequestDetails,
    matched: MatchedPair,
) -> Result<ResponseDetails> {
    let mut response = context.render_response(&request, &matched, true)?;

    if context.middleware().is_some() {
        let pair = context
            .run_middleware(RequestResponsePair::new(request.clone(), response))
            .await?;
        response = pair.response;
    }

    let rule_response = &matched.pair.response;
    if rule_response.affects_state() {
        debug!("applying state effects of matched rule for {}", request);
        context.apply_state_effects(rule_response);
    }
    context.apply_delay(&request, rule_response).await;
    Ok(response)
}
