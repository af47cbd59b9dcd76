//! Sync counters.
//!
//! A [`SyncResult`] counts what one reconciler pass did to one resource kind
//! under one parent. A [`SyncResultSet`] accumulates those per resource
//! keyword across a whole cascading sync and is what gets persisted on the
//! sync unit and handed back to callers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of reconciling one local collection against one remote collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    #[serde(default)]
    pub add_cnt: u32,
    #[serde(default)]
    pub add_err_cnt: u32,
    #[serde(default)]
    pub update_cnt: u32,
    #[serde(default)]
    pub update_err_cnt: u32,
    #[serde(default)]
    pub del_cnt: u32,
    #[serde(default)]
    pub del_err_cnt: u32,
    /// Set when the pass could not run at all (store query or comparison
    /// failed). Item failures only bump the error counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SyncResult {
    pub fn add(&mut self) {
        self.add_cnt += 1;
    }

    pub fn add_error(&mut self, err: impl fmt::Display) {
        self.add_err_cnt += 1;
        log::warn!("sync add failed: {}", err);
    }

    pub fn update(&mut self) {
        self.update_cnt += 1;
    }

    pub fn update_error(&mut self, err: impl fmt::Display) {
        self.update_err_cnt += 1;
        log::warn!("sync update failed: {}", err);
    }

    pub fn delete(&mut self) {
        self.del_cnt += 1;
    }

    pub fn delete_error(&mut self, err: impl fmt::Display) {
        self.del_err_cnt += 1;
        log::warn!("sync delete failed: {}", err);
    }

    /// Records a pass-level failure. The subtree below is not walked.
    pub fn error(&mut self, err: impl fmt::Display) {
        self.error = Some(err.to_string());
    }

    /// Whether the pass itself failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether any item failed.
    pub fn has_item_errors(&self) -> bool {
        self.add_err_cnt + self.update_err_cnt + self.del_err_cnt > 0
    }

    /// Whether anything was created or changed.
    pub fn has_adds_or_updates(&self) -> bool {
        self.add_cnt > 0 || self.update_cnt > 0
    }

    /// Adds another result's counters to this one. Pass-level errors are
    /// kept if this result has none yet.
    pub fn merge(&mut self, other: &SyncResult) {
        self.add_cnt += other.add_cnt;
        self.add_err_cnt += other.add_err_cnt;
        self.update_cnt += other.update_cnt;
        self.update_err_cnt += other.update_err_cnt;
        self.del_cnt += other.del_cnt;
        self.del_err_cnt += other.del_err_cnt;
        if self.error.is_none() {
            self.error.clone_from(&other.error);
        }
    }
}

impl fmt::Display for SyncResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "removed {} failed {} updated {} failed {} added {} failed {}",
            self.del_cnt,
            self.del_err_cnt,
            self.update_cnt,
            self.update_err_cnt,
            self.add_cnt,
            self.add_err_cnt
        )?;
        if let Some(err) = &self.error {
            write!(f, " error: {}", err)?;
        }
        Ok(())
    }
}

/// Per-keyword totals for a whole sync. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncResultSet(BTreeMap<String, SyncResult>);

impl SyncResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulates `result` under `keyword` (a resource kind's plural name).
    pub fn add(&mut self, keyword: &str, result: &SyncResult) {
        self.0
            .entry(keyword.to_string())
            .or_default()
            .merge(result);
    }

    pub fn get(&self, keyword: &str) -> Option<&SyncResult> {
        self.0.get(keyword)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SyncResult)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum over all keywords.
    pub fn total(&self) -> SyncResult {
        let mut total = SyncResult::default();
        for result in self.0.values() {
            total.merge(result);
        }
        total
    }

    /// True unless `keyword` saw at least one add or update. A keyword that
    /// was never reconciled counts as empty.
    pub fn is_empty_for(&self, keyword: &str) -> bool {
        !self
            .0
            .get(keyword)
            .is_some_and(SyncResult::has_adds_or_updates)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
