//! Process state: the shared key/value map that stateful rules read as a
//! precondition and update as a side effect.
//!
//! Owned by one engine instance and passed by reference, so several engines
//! can coexist in the same process.

use crate::metrics;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Prefix of the per-fingerprint counters written by stateful capture.
pub const SEQUENCE_PREFIX: &str = "sequence:";

#[derive(Debug, Default)]
pub struct ProcessState {
    data: RwLock<HashMap<String, String>>,
}

impl ProcessState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomic snapshot of the whole state.
    pub fn get(&self) -> HashMap<String, String> {
        self.data.read().clone()
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    /// Merge `entries` into the state, overwriting on key collision.
    pub fn patch<'a, I>(&self, entries: I)
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let mut data = self.data.write();
        let mut changed = 0usize;
        for (key, value) in entries {
            data.insert(key.clone(), value.clone());
            changed += 1;
        }
        if changed > 0 {
            debug!(keys = changed, "state patched");
            metrics::record_state_transition("patch");
        }
    }

    pub fn remove<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut data = self.data.write();
        let mut removed = 0usize;
        for key in keys {
            if data.remove(key).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(keys = removed, "state keys removed");
            metrics::record_state_transition("remove");
        }
    }

    /// Replace the whole state.
    pub fn set_all(&self, state: HashMap<String, String>) {
        *self.data.write() = state;
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }

    /// Initialize every `sequence:` key that is not yet present to `"1"`.
    pub fn initialize_sequences<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut data = self.data.write();
        for key in keys {
            if key.starts_with(SEQUENCE_PREFIX) && !data.contains_key(key) {
                data.insert(key.clone(), "1".to_string());
            }
        }
    }

    /// Set every `sequence:` key among `keys` back to `"1"`. Returns the
    /// number of keys rewound.
    pub fn rewind_sequences<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut data = self.data.write();
        let mut rewound = 0;
        for key in keys {
            if key.starts_with(SEQUENCE_PREFIX) {
                data.insert(key.clone(), "1".to_string());
                rewound += 1;
            }
        }
        if rewound > 0 {
            debug!(keys = rewound, "sequences rewound");
        }
        rewound
    }

    /// Advance a sequence counter, returning `(current, next)`. A missing or
    /// non-numeric counter starts at 1.
    pub fn next_sequence(&self, key: &str) -> (String, String) {
        let mut data = self.data.write();
        let current = data
            .get(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(1);
        let next = current + 1;
        data.insert(key.to_string(), next.to_string());
        (current.to_string(), next.to_string())
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_patch_overwrites() {
        let state = ProcessState::new();
        let mut first = BTreeMap::new();
        first.insert("eggs".to_string(), "absent".to_string());
        state.patch(&first);
        first.insert("eggs".to_string(), "present".to_string());
        first.insert("milk".to_string(), "present".to_string());
        state.patch(&first);

        assert_eq!(state.value("eggs").as_deref(), Some("present"));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_snapshot_is_isolated() {
        let state = ProcessState::new();
        state.patch(&BTreeMap::from([("a".to_string(), "1".to_string())]));
        let snapshot = state.get();
        state.remove(&["a".to_string()]);

        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_remove_missing_keys_is_noop() {
        let state = ProcessState::new();
        state.remove(&["nothing".to_string()]);
        assert!(state.is_empty());
    }

    #[test]
    fn test_sequences() {
        let state = ProcessState::new();
        assert_eq!(state.next_sequence("sequence:1"), ("1".into(), "2".into()));
        assert_eq!(state.next_sequence("sequence:1"), ("2".into(), "3".into()));

        state.initialize_sequences(&["sequence:1".to_string(), "sequence:2".to_string(), "other".to_string()]);
        assert_eq!(state.value("sequence:1").as_deref(), Some("3"));
        assert_eq!(state.value("sequence:2").as_deref(), Some("1"));
        assert!(state.value("other").is_none());
    }

    #[test]
    fn test_rewind_sequences() {
        let state = ProcessState::new();
        state.next_sequence("sequence:1");
        state.next_sequence("sequence:1");
        let mut other = HashMap::new();
        other.insert("basket".to_string(), "full".to_string());
        state.patch(&other);

        let keys = ["sequence:1".to_string(), "sequence:2".to_string(), "basket".to_string()];
        assert_eq!(state.rewind_sequences(&keys), 2);
        assert_eq!(state.value("sequence:1").as_deref(), Some("1"));
        assert_eq!(state.value("sequence:2").as_deref(), Some("1"));
        assert_eq!(state.value("basket").as_deref(), Some("full"));
    }
}
