use super::format::{GlobalActions, Simulation};
use crate::models::RequestMatcherResponsePair;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Ordered, de-duplicated rule set.
///
/// Readers take a cheap `Arc` snapshot and match against it without holding
/// the lock; writers replace the vector (copy-on-write).
#[derive(Debug, Default)]
pub struct SimulationStore {
    pairs: RwLock<Arc<Vec<RequestMatcherResponsePair>>>,
    global_actions: RwLock<Arc<GlobalActions>>,
}

impl SimulationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The rules, in store order.
    pub fn pairs(&self) -> Arc<Vec<RequestMatcherResponsePair>> {
        Arc::clone(&self.pairs.read())
    }

    pub fn global_actions(&self) -> Arc<GlobalActions> {
        Arc::clone(&self.global_actions.read())
    }

    /// Append `pair` unless a structurally-equal matcher is already stored.
    /// Returns whether it was added.
    pub fn add_pair(&self, pair: RequestMatcherResponsePair) -> bool {
        let mut guard = self.pairs.write();
        if guard
            .iter()
            .any(|p| p.request_matcher == pair.request_matcher)
        {
            debug!("skipping duplicate request matcher");
            return false;
        }
        Arc::make_mut(&mut guard).push(pair);
        true
    }

    /// Store `pair`, replacing the response of a structurally-equal matcher in
    /// place when one exists. Returns whether an existing pair was replaced.
    pub fn add_pair_overwriting(&self, pair: RequestMatcherResponsePair) -> bool {
        let mut guard = self.pairs.write();
        let pairs = Arc::make_mut(&mut guard);
        match pairs
            .iter_mut()
            .find(|p| p.request_matcher == pair.request_matcher)
        {
            Some(existing) => {
                debug!("overwriting duplicate request matcher");
                *existing = pair;
                true
            }
            None => {
                pairs.push(pair);
                false
            }
        }
    }

    /// Replace the whole simulation. Duplicate matchers in `simulation` are
    /// dropped, keeping the first occurrence.
    pub fn replace(&self, simulation: Simulation) {
        let pairs = dedup(Vec::new(), simulation.pairs);
        info!(
            pairs = pairs.len(),
            delays = simulation.global_actions.delays.len(),
            delays_log_normal = simulation.global_actions.delays_log_normal.len(),
            "simulation imported"
        );
        *self.pairs.write() = Arc::new(pairs);
        *self.global_actions.write() = Arc::new(simulation.global_actions);
    }

    /// Append the rules and global delays of `simulation`. Returns the number
    /// of rules added.
    pub fn append(&self, simulation: Simulation) -> usize {
        let added = {
            let mut guard = self.pairs.write();
            let before = guard.len();
            let merged = dedup(Vec::clone(&guard), simulation.pairs);
            *guard = Arc::new(merged);
            guard.len() - before
        };

        let mut actions = self.global_actions.write();
        let merged = Arc::make_mut(&mut actions);
        merged.delays.extend(simulation.global_actions.delays);
        merged
            .delays_log_normal
            .extend(simulation.global_actions.delays_log_normal);

        info!(added, "simulation appended");
        added
    }

    pub fn clear(&self) {
        *self.pairs.write() = Arc::new(Vec::new());
        *self.global_actions.write() = Arc::new(GlobalActions::default());
        info!("simulation cleared");
    }

    pub fn export(&self) -> Simulation {
        Simulation {
            pairs: Vec::clone(&self.pairs()),
            global_actions: GlobalActions::clone(&self.global_actions()),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.read().is_empty()
    }
}

fn dedup(
    mut existing: Vec<RequestMatcherResponsePair>,
    incoming: Vec<RequestMatcherResponsePair>,
) -> Vec<RequestMatcherResponsePair> {
    for pair in incoming {
        if !existing
            .iter()
            .any(|p| p.request_matcher == pair.request_matcher)
        {
            existing.push(pair);
        }
    }
    existing
}
