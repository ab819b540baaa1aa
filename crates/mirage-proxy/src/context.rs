//! Shared engine state and the steps the mode handlers are composed from.
//!
//! One `EngineContext` is owned by each [`crate::Engine`]; nothing here is a
//! process-wide singleton, so several engines can coexist in one test binary.

use crate::cache::{CachedResponse, MatchCache};
use crate::config::CacheConfig;
use crate::delay::{resolve_delay, Delayer, TokioDelayer};
use crate::diff::DiffStore;
use crate::error::{EngineError, Result};
use crate::forwarding::Forwarder;
use crate::matching::{match_request, MatchResult, MatchingFailure};
use crate::middleware::{Middleware, RequestResponsePair};
use crate::models::{Fingerprint, RequestDetails, RequestMatcherResponsePair, ResponseDetails};
use crate::modes::ModeArguments;
use crate::simulation::SimulationStore;
use crate::state::{ProcessState, SEQUENCE_PREFIX};
use crate::template::{DefaultTemplator, Templator};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// A successful match together with everything needed to build its response.
#[derive(Debug, Clone)]
pub struct MatchedPair {
    pub pair: RequestMatcherResponsePair,
    /// The cache entry the outcome came from or was stored in.
    pub cached: Option<Arc<CachedResponse>>,
    /// State snapshot the match was evaluated against.
    pub state: HashMap<String, String>,
}

pub struct EngineContext {
    pub simulation: SimulationStore,
    pub state: ProcessState,
    pub cache: MatchCache,
    pub diffs: DiffStore,
    forwarder: Arc<dyn Forwarder>,
    templator: Arc<dyn Templator>,
    delayer: Arc<dyn Delayer>,
    middleware: RwLock<Option<Arc<dyn Middleware>>>,
    arguments: RwLock<ModeArguments>,
    webserver: AtomicBool,
    sequences: Mutex<HashMap<Fingerprint, String>>,
}

impl EngineContext {
    pub fn new(forwarder: Arc<dyn Forwarder>, cache: CacheConfig) -> Self {
        Self {
            simulation: SimulationStore::new(),
            state: ProcessState::new(),
            cache: MatchCache::new(cache),
            diffs: DiffStore::new(),
            forwarder,
            templator: Arc::new(DefaultTemplator),
            delayer: Arc::new(TokioDelayer),
            middleware: RwLock::new(None),
            arguments: RwLock::new(ModeArguments::default()),
            webserver: AtomicBool::new(false),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_templator(mut self, templator: Arc<dyn Templator>) -> Self {
        self.templator = templator;
        self
    }

    pub fn with_delayer(mut self, delayer: Arc<dyn Delayer>) -> Self {
        self.delayer = delayer;
        self
    }

    pub fn middleware(&self) -> Option<Arc<dyn Middleware>> {
        self.middleware.read().clone()
    }

    pub fn set_middleware(&self, middleware: Option<Arc<dyn Middleware>>) {
        *self.middleware.write() = middleware;
    }

    /// The configured middleware, or `MiddlewareNotSet`.
    pub fn require_middleware(&self) -> Result<Arc<dyn Middleware>> {
        self.middleware().ok_or(EngineError::MiddlewareNotSet)
    }

    pub fn arguments(&self) -> ModeArguments {
        self.arguments.read().clone()
    }

    pub fn set_arguments(&self, arguments: ModeArguments) {
        *self.arguments.write() = arguments;
    }

    pub fn is_webserver(&self) -> bool {
        self.webserver.load(Ordering::Acquire)
    }

    /// Switch between proxy and standalone-server deployment. Cached outcomes
    /// are rekeyed for the new fingerprint scheme, unless some rule constrains
    /// the destination: the destination matcher only applies in proxy
    /// deployment, so those outcomes are dropped instead.
    pub fn set_webserver(&self, webserver: bool) {
        self.webserver.store(webserver, Ordering::Release);
        let host_sensitive = self
            .simulation
            .pairs()
            .iter()
            .any(|pair| pair.request_matcher.constrains_destination());
        if host_sensitive {
            self.cache.reset_webserver(webserver);
        } else {
            self.cache.set_webserver(webserver);
        }
    }

    /// Resolve `request` against the simulation store, consulting the cache
    /// first. A read-only lookup never writes the cache.
    pub fn find_match(&self, request: &RequestDetails, read_only: bool) -> Result<MatchedPair> {
        let state = self.state.get();

        if let Some(cached) = self.cache.get(request) {
            return match &cached.matching_pair {
                Some(pair) => Ok(MatchedPair {
                    pair: pair.clone(),
                    cached: Some(Arc::clone(&cached)),
                    state,
                }),
                None => Err(EngineError::MatchingFailed(Box::new(MatchingFailure::new(
                    request,
                    &state,
                    cached.closest_miss.clone(),
                )))),
            };
        }

        // Read before the simulation and the scheme: the cache refuses an
        // outcome computed from either once it has been reset.
        let generation = self.cache.generation();
        let strategy = self.arguments.read().matching_strategy;
        let pairs = self.simulation.pairs();
        let result = match_request(strategy, request, &pairs, &state, self.is_webserver());
        let cached = if read_only {
            None
        } else {
            self.store_outcome(request, &result, generation)
        };

        match result.pair {
            Some(pair) => Ok(MatchedPair {
                pair,
                cached,
                state,
            }),
            None => Err(EngineError::MatchingFailed(Box::new(MatchingFailure::new(
                request,
                &state,
                result.closest_miss,
            )))),
        }
    }

    /// Cache a cacheable match outcome computed at `generation`. Returns the
    /// stored entry, or `None` when nothing was stored.
    fn store_outcome(
        &self,
        request: &RequestDetails,
        result: &MatchResult,
        generation: u64,
    ) -> Option<Arc<CachedResponse>> {
        if !result.cacheable {
            return None;
        }
        let value = match (&result.pair, &result.closest_miss) {
            (Some(pair), _) => CachedResponse::matched(request.clone(), pair.clone()),
            (None, Some(closest)) => CachedResponse::missed(request.clone(), closest.clone()),
            (None, None) => return None,
        };
        self.cache.set_if_current(value, generation)
    }

    /// The response a matched pair produces for `request`, with templating
    /// applied. Compiled templates are memoized on the cache entry when
    /// `memoize` is set.
    pub fn render_response(
        &self,
        request: &RequestDetails,
        matched: &MatchedPair,
        memoize: bool,
    ) -> Result<ResponseDetails> {
        let mut response = matched.pair.response.clone();
        if !response.templated {
            return Ok(response);
        }

        let compiled = match (&matched.cached, memoize) {
            (Some(cached), true) => {
                cached.compiled_template(|| self.templator.compile(&response.body))?
            }
            _ => Arc::new(self.templator.compile(&response.body)?),
        };
        response.body = self.templator.render(&compiled, request, &matched.state)?;
        trace!("rendered templated response for {}", request);
        Ok(response)
    }

    /// Apply the state effects declared by a selected response.
    pub fn apply_state_effects(&self, response: &ResponseDetails) {
        if !response.transitions_state.is_empty() {
            self.state.patch(&response.transitions_state);
        }
        if !response.removes_state.is_empty() {
            self.state.remove(&response.removes_state);
        }
    }

    /// Wait for the delay configured for `response`, if any.
    pub async fn apply_delay(&self, request: &RequestDetails, response: &ResponseDetails) {
        let global = self.simulation.global_actions();
        if let Some(delay) = resolve_delay(
            response,
            request,
            &global.delays,
            &global.delays_log_normal,
        ) {
            self.delayer.delay(delay).await;
        }
    }

    pub async fn forward(&self, request: &RequestDetails) -> Result<ResponseDetails> {
        self.forwarder.forward(request).await
    }

    /// Run the configured middleware, if any, over `pair`.
    pub async fn run_middleware(&self, pair: RequestResponsePair) -> Result<RequestResponsePair> {
        match self.middleware() {
            Some(middleware) => {
                debug!(middleware = middleware.name(), "executing middleware");
                middleware.execute(pair).await
            }
            None => Ok(pair),
        }
    }

    /// Store a recorded pair and invalidate cached outcomes.
    pub fn save_pair(&self, pair: RequestMatcherResponsePair, overwrite: bool) -> bool {
        let changed = if overwrite {
            self.simulation.add_pair_overwriting(pair);
            true
        } else {
            self.simulation.add_pair(pair)
        };
        if changed {
            self.cache.flush();
        }
        changed
    }

    /// Rewind the `sequence:` keys the simulation requires, so stateful
    /// captures replay from their first response.
    pub fn rewind_sequences(&self) -> usize {
        let pairs = self.simulation.pairs();
        self.state.rewind_sequences(
            pairs
                .iter()
                .flat_map(|pair| pair.request_matcher.required_state().map(|(key, _)| key)),
        )
    }

    /// The `sequence:N` state key of a request identity. Identities are
    /// numbered in order of first capture.
    pub fn sequence_key(&self, request: &RequestDetails) -> String {
        let fingerprint = request.fingerprint(!self.is_webserver());
        let mut sequences = self.sequences.lock();
        let next = sequences.len() + 1;
        sequences
            .entry(fingerprint)
            .or_insert_with(|| format!("{SEQUENCE_PREFIX}{next}"))
            .clone()
    }
}
