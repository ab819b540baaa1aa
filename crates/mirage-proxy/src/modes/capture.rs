use super::{Mode, ModeArguments, ModeHandler};
use crate::context::EngineContext;
use crate::error::Result;
use crate::middleware::RequestResponsePair;
use crate::models::{
    FieldMatcher, RequestDetails, RequestMatcher, RequestMatcherResponsePair, ResponseDetails,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Forwards every request live and records the exchange as a new pair.
pub struct CaptureMode {
    context: Arc<EngineContext>,
}

impl CaptureMode {
    pub fn new(context: Arc<EngineContext>) -> Self {
        Self { context }
    }

    fn record(&self, request: &RequestDetails, live: &ResponseDetails, arguments: &ModeArguments) {
        let mut matcher = recorded_matcher(request, arguments);
        let mut response = live.clone();

        if arguments.stateful {
            let key = self.context.sequence_key(request);
            let (current, next) = self.context.state.next_sequence(&key);
            matcher = matcher.with_required_state(&key, &current);
            response.transitions_state.insert(key, next);
        }

        let pair = RequestMatcherResponsePair::new(matcher, response);
        if self.context.save_pair(pair, arguments.overwrite_duplicate) {
            info!(status = live.status, "captured {}", request);
        } else {
            debug!("duplicate capture of {} skipped", request);
        }
    }
}

/// Exact matchers for every core field of `request`, plus the whitelisted
/// headers.
pub(crate) fn recorded_matcher(request: &RequestDetails, arguments: &ModeArguments) -> RequestMatcher {
    let mut matcher = RequestMatcher::default()
        .with_path(FieldMatcher::exact(&request.path))
        .with_method(FieldMatcher::exact(&request.method))
        .with_destination(FieldMatcher::exact(&request.destination))
        .with_scheme(FieldMatcher::exact(&request.scheme))
        .with_body(FieldMatcher::exact(&request.body));

    for key in request.query.keys() {
        if let Some(value) = request.query_value(key) {
            matcher = matcher.with_query(key, FieldMatcher::exact(value));
        }
    }

    for name in request.headers.keys() {
        if arguments.captures_header(name) {
            if let Some(value) = request.header_value(name) {
                matcher = matcher.with_header(name, FieldMatcher::exact(value));
            }
        }
    }

    matcher
}

#[async_trait]
impl ModeHandler for CaptureMode {
    fn mode(&self) -> Mode {
        Mode::Capture
    }

    async fn process(&self, request: RequestDetails) -> Result<ResponseDetails> {
        let arguments = self.context.arguments();
        let request = self
            .context
            .run_middleware(RequestResponsePair::new(request, ResponseDetails::default()))
            .await?
            .request;

        let live = self.context.forward(&request).await?;
        self.record(&request, &live, &arguments);
        Ok(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatcherKind;

    #[test]
    fn test_recorded_matcher_is_eager_without_headers() {
        let request = RequestDetails::new("GET", "http", "api.example.com", "/items", Some("b=2&a=1"))
            .with_header("Accept", "application/json");
        let matcher = recorded_matcher(&request, &ModeArguments::default());

        assert!(matcher.headers.is_none());
        let query = matcher.query.as_ref().unwrap();
        assert_eq!(query.len(), 2);
        assert_eq!(query["a"][0].scalar_value(), "1");
        assert!(matcher.is_eagerly_cacheable());
    }

    #[test]
    fn test_recorded_matcher_header_whitelist() {
        let request = RequestDetails::new("GET", "http", "api.example.com", "/items", None)
            .with_header("Accept", "application/json")
            .with_header("Authorization", "Bearer x");

        let arguments = ModeArguments {
            headers: vec!["accept".to_string()],
            ..Default::default()
        };
        let matcher = recorded_matcher(&request, &arguments);
        let headers = matcher.headers.as_ref().unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["Accept"][0].kind, MatcherKind::Exact);
        assert!(!matcher.is_eagerly_cacheable());

        let all = ModeArguments {
            headers: vec!["*".to_string()],
            ..Default::default()
        };
        assert_eq!(recorded_matcher(&request, &all).headers.unwrap().len(), 2);
    }
}
