use super::engine::DiffEntry;
use crate::models::SimpleRequest;
use chrono::{SecondsFormat, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The outcome of one comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffReport {
    /// RFC 3339 time of the comparison.
    pub timestamp: String,
    pub diff_entries: Vec<DiffEntry>,
}

/// Diff reports grouped by simplified request identity.
#[derive(Debug, Default)]
pub struct DiffStore {
    reports: RwLock<HashMap<SimpleRequest, Vec<DiffReport>>>,
}

impl DiffStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the entries of one comparison. Empty comparisons are not kept.
    pub fn record(&self, request: SimpleRequest, entries: Vec<DiffEntry>) -> Option<DiffReport> {
        if entries.is_empty() {
            return None;
        }
        let report = DiffReport {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            diff_entries: entries,
        };
        self.reports
            .write()
            .entry(request)
            .or_default()
            .push(report.clone());
        Some(report)
    }

    pub fn get(&self, request: &SimpleRequest) -> Vec<DiffReport> {
        self.reports.read().get(request).cloned().unwrap_or_default()
    }

    /// Every report, ordered by request identity.
    pub fn all(&self) -> BTreeMap<SimpleRequest, Vec<DiffReport>> {
        self.reports
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.reports.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.reports.read().is_empty()
    }
}
