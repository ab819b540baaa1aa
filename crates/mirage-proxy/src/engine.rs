//! The engine: owns the stores, the active mode and the collaborators, and
//! exposes the control surface used by the binary and by tests.

use crate::cache::CacheMetrics;
use crate::config::{CacheConfig, Config};
use crate::context::EngineContext;
use crate::delay::Delayer;
use crate::diff::DiffReport;
use crate::error::{EngineError, Result};
use crate::forwarding::{Forwarder, HttpForwarder};
use crate::metrics;
use crate::middleware::{Middleware, RhaiMiddleware};
use crate::models::{RequestDetails, ResponseDetails, SimpleRequest};
use crate::modes::{Mode, ModeArguments, ModeDispatcher};
use crate::simulation::Simulation;
use crate::template::Templator;
use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Status of the response synthesized for a failed request.
pub const ERROR_STATUS: u16 = 502;

pub struct Engine {
    context: Arc<EngineContext>,
    dispatcher: ModeDispatcher,
}

/// Builder for [`Engine`]. Collaborators left unset fall back to the built-in
/// implementations.
#[derive(Default)]
pub struct EngineBuilder {
    mode: Mode,
    arguments: ModeArguments,
    webserver: bool,
    cache: CacheConfig,
    forwarder: Option<Arc<dyn Forwarder>>,
    templator: Option<Arc<dyn Templator>>,
    delayer: Option<Arc<dyn Delayer>>,
    middleware: Option<Arc<dyn Middleware>>,
}

impl EngineBuilder {
    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn arguments(mut self, arguments: ModeArguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn webserver(mut self, webserver: bool) -> Self {
        self.webserver = webserver;
        self
    }

    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn forwarder(mut self, forwarder: Arc<dyn Forwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn templator(mut self, templator: Arc<dyn Templator>) -> Self {
        self.templator = Some(templator);
        self
    }

    pub fn delayer(mut self, delayer: Arc<dyn Delayer>) -> Self {
        self.delayer = Some(delayer);
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware = Some(middleware);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let forwarder = match self.forwarder {
            Some(forwarder) => forwarder,
            None => Arc::new(HttpForwarder::new(Duration::from_secs(30), None)?),
        };

        let mut context = EngineContext::new(forwarder, self.cache);
        if let Some(templator) = self.templator {
            context = context.with_templator(templator);
        }
        if let Some(delayer) = self.delayer {
            context = context.with_delayer(delayer);
        }
        context.set_arguments(self.arguments);
        context.set_middleware(self.middleware);
        context.set_webserver(self.webserver);

        let context = Arc::new(context);
        let dispatcher = ModeDispatcher::new(Arc::clone(&context), self.mode);
        Ok(Engine {
            context,
            dispatcher,
        })
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Build an engine from a validated configuration, importing its
    /// simulation file and loading its middleware script.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mode: Mode = config.mode.parse()?;
        let forwarder = HttpForwarder::new(config.forwarding.timeout(), config.upstream.clone())?;

        let mut builder = Engine::builder()
            .mode(mode)
            .arguments(config.mode_arguments.clone())
            .webserver(config.webserver)
            .cache(config.cache.clone())
            .forwarder(Arc::new(forwarder));

        if let Some(middleware) = &config.middleware {
            let (source, label) = middleware.load()?;
            builder = builder.middleware(Arc::new(RhaiMiddleware::new(&source, &label)?));
        }

        let engine = builder.build()?;

        if let Some(path) = &config.simulation {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read simulation {}", path.display()))?;
            let pairs = engine.import_simulation(&json)?;
            info!("Imported {} pairs from {}", pairs, path.display());
        }

        Ok(engine)
    }

    pub fn mode(&self) -> Mode {
        self.dispatcher.mode()
    }

    pub fn arguments(&self) -> ModeArguments {
        self.context.arguments()
    }

    /// Switch to the mode named `name`. An unknown name is rejected and
    /// leaves the engine untouched.
    ///
    /// Leaving capture rewinds the captured `sequence:` keys to 1, so a
    /// stateful capture replays from its first response.
    pub fn set_mode(&self, name: &str, arguments: Option<ModeArguments>) -> Result<()> {
        let mode: Mode = name.parse()?;
        let previous = self.dispatcher.mode();
        if let Some(arguments) = arguments {
            self.context.set_arguments(arguments);
        }
        self.dispatcher.set_mode(mode);
        if previous == Mode::Capture && mode != Mode::Capture {
            self.context.rewind_sequences();
        }
        info!(mode = %mode, "mode changed");
        Ok(())
    }

    pub fn is_webserver(&self) -> bool {
        self.context.is_webserver()
    }

    pub fn set_webserver(&self, webserver: bool) {
        self.context.set_webserver(webserver);
    }

    /// Replace the simulation with `json` (rule format). Returns the number of
    /// pairs stored.
    pub fn import_simulation(&self, json: &str) -> Result<usize> {
        let simulation = Simulation::from_json(json)?;
        self.context
            .state
            .initialize_sequences(simulation.required_state_keys());
        self.context.simulation.replace(simulation);
        self.context.cache.flush();
        Ok(self.context.simulation.len())
    }

    /// Append the pairs of `json` to the simulation. Returns the number added.
    pub fn add_simulation(&self, json: &str) -> Result<usize> {
        let simulation = Simulation::from_json(json)?;
        self.context
            .state
            .initialize_sequences(simulation.required_state_keys());
        let added = self.context.simulation.append(simulation);
        self.context.cache.flush();
        Ok(added)
    }

    pub fn export_simulation(&self) -> Simulation {
        self.context.simulation.export()
    }

    pub fn clear_simulation(&self) {
        self.context.simulation.clear();
        self.context.cache.flush();
    }

    pub fn set_middleware(&self, middleware: Option<Arc<dyn Middleware>>) {
        self.context.set_middleware(middleware);
    }

    pub fn state(&self) -> HashMap<String, String> {
        self.context.state.get()
    }

    pub fn patch_state(&self, state: &HashMap<String, String>) {
        self.context.state.patch(state);
    }

    pub fn remove_state(&self, keys: &[String]) {
        self.context.state.remove(keys);
    }

    pub fn clear_state(&self) {
        self.context.state.clear();
    }

    pub fn diffs(&self) -> BTreeMap<SimpleRequest, Vec<DiffReport>> {
        self.context.diffs.all()
    }

    pub fn clear_diffs(&self) {
        self.context.diffs.clear();
    }

    pub fn flush_cache(&self) {
        self.context.cache.flush();
    }

    pub fn cache_metrics(&self) -> CacheMetrics {
        self.context.cache.metrics()
    }

    /// Resolve `request` with the active mode. Failures are answered with a
    /// synthesized error response, never propagated.
    pub async fn process(&self, request: RequestDetails) -> ResponseDetails {
        let method = request.method.clone();
        let destination = request.destination.clone();
        let path = request.path.clone();

        let (mode, result) = self.dispatcher.process(request).await;
        match result {
            Ok(response) => {
                metrics::record_request(mode.as_str(), "ok");
                debug!(mode = %mode, status = response.status, "{} {}{}", method, destination, path);
                response
            }
            Err(e) => {
                metrics::record_request(mode.as_str(), e.kind());
                match &e {
                    EngineError::MatchingFailed(_) => warn!(
                        mode = %mode,
                        kind = e.kind(),
                        %method,
                        %destination,
                        %path,
                        "{}",
                        e
                    ),
                    _ => error!(
                        mode = %mode,
                        kind = e.kind(),
                        %method,
                        %destination,
                        %path,
                        "{}",
                        e
                    ),
                }
                error_response(&e)
            }
        }
    }
}

/// The response returned in place of a failed request.
pub fn error_response(error: &EngineError) -> ResponseDetails {
    let body = serde_json::json!({ "error": error.to_string() }).to_string();
    ResponseDetails::new(ERROR_STATUS, body).with_header("Content-Type", "application/json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoForwarder;

    #[async_trait]
    impl Forwarder for NoForwarder {
        async fn forward(&self, _request: &RequestDetails) -> Result<ResponseDetails> {
            Err(EngineError::ForwardingFailed("connection refused".into()))
        }
    }

    fn engine() -> Engine {
        Engine::builder()
            .forwarder(Arc::new(NoForwarder))
            .build()
            .unwrap()
    }

    #[test]
    fn test_invalid_mode_has_no_side_effect() {
        let engine = engine();
        engine.set_mode("capture", None).unwrap();
        let args = ModeArguments {
            stateful: true,
            ..Default::default()
        };
        assert!(matches!(
            engine.set_mode("record", Some(args)),
            Err(EngineError::InvalidMode(_))
        ));
        assert_eq!(engine.mode(), Mode::Capture);
        assert!(!engine.arguments().stateful);
    }

    #[test]
    fn test_error_response_shape() {
        let response = error_response(&EngineError::ForwardingFailed("boom \"x\"".into()));
        assert_eq!(response.status, 502);
        assert_eq!(
            response.header_values("content-type").unwrap(),
            &["application/json".to_string()]
        );
        let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
        assert_eq!(body["error"], "forwarding failed: boom \"x\"");
    }

    #[tokio::test]
    async fn test_process_never_errors() {
        let engine = engine();
        let request = RequestDetails::new("GET", "http", "api.example.com", "/x", None);

        let response = engine.process(request.clone()).await;
        assert_eq!(response.status, 502);
        assert!(response.body.contains("no simulation matched"));

        engine.set_mode("synthesize", None).unwrap();
        let response = engine.process(request.clone()).await;
        assert!(response.body.contains("middleware not set"));

        engine.set_mode("spy", None).unwrap();
        let response = engine.process(request).await;
        assert!(response.body.contains("connection refused"));
    }

    #[test]
    fn test_import_initializes_sequences() {
        let engine = engine();
        let json = r#"{"pairs": [{
            "requestMatcher": {"path": [{"matcher": "exact", "value": "/a"}],
                               "requiresState": {"sequence:1": "1", "other": "x"}},
            "response": {"status": 200, "body": "one"}
        }]}"#;
        assert_eq!(engine.import_simulation(json).unwrap(), 1);
        let state = engine.state();
        assert_eq!(state.get("sequence:1").map(String::as_str), Some("1"));
        assert!(!state.contains_key("other"));

        assert!(matches!(
            engine.import_simulation("42"),
            Err(EngineError::InvalidSimulation(_))
        ));
        assert_eq!(engine.export_simulation().pairs.len(), 1);
    }
}
