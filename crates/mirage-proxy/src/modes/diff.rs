use super::{Mode, ModeHandler};
use crate::context::EngineContext;
use crate::diff::diff;
use crate::error::{EngineError, Result};
use crate::models::{RequestDetails, ResponseDetails};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Forwards live and records how the live response differs from the
/// simulated one. The live response is always returned unchanged.
pub struct DiffMode {
    context: Arc<EngineContext>,
}

impl DiffMode {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    fn compare(&self, request: &RequestDetails, live: &ResponseDetails) {
        let matched = match self.context.find_match(request, true) {
            Ok(matched) => matched,
            Err(EngineError::MatchingFailed(_)) => {
                info!(
                    method = %request.method,
                    destination = %request.destination,
                    path = %request.path,
                    "no simulation"
                );
                return;
            }
            Err(e) => {
                warn!("diff lookup failed for {}: {}", request, e);
                return;
            }
        };

        let expected = match self.context.render_response(request, &matched, false) {
            Ok(expected) => expected,
            Err(e) => {
                warn!("could not render simulated response for {}: {}", request, e);
                return;
            }
        };

        let entries = diff(&expected, live);
        debug!(differences = entries.len(), "compared live response for {}", request);
        self.context.diffs.record(request.simple(), entries);
    }
}

#[async_trait]
impl ModeHandler for DiffMode {
    fn mode(&self) -> Mode {
        Mode::Diff
    }

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails> {
        let live = self.context.forward(&request).await?;
        self.compare(&request, &live);
        Ok(live)
    }
}
