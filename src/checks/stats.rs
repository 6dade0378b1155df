//! Stats table: cumulative per-cell health for the current session.
//!
//! A cell is one (project, model) pair. Its record is created by the
//! first merge and then overwritten by every later one. Status and
//! latency are last-write-wins; the session counter only accumulates,
//! so it stays exact no matter in which order probes complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::gateway::{ProbeOutcome, ProbeStatus};
use crate::projects::ProjectId;

/// Composite identity of a matrix cell.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellKey {
    pub project_id: ProjectId,
    pub model_id: String,
}

impl CellKey {
    pub fn new(project_id: ProjectId, model_id: impl Into<String>) -> Self {
        Self {
            project_id,
            model_id: model_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    Unknown,
    Checking,
    Online,
    Offline,
}

impl From<ProbeStatus> for CellStatus {
    fn from(status: ProbeStatus) -> Self {
        match status {
            ProbeStatus::Online => CellStatus::Online,
            ProbeStatus::Offline => CellStatus::Offline,
        }
    }
}

/// Session statistics for one cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStats {
    pub model_id: String,
    pub project_id: ProjectId,
    /// Latency of the most recent probe; `None` until probed.
    pub latency_ms: Option<u64>,
    pub status: CellStatus,
    pub requests_in_session: u64,
    /// Reserved for real token accounting; merges carry it over untouched.
    pub tokens_in_session: u64,
    pub last_check: DateTime<Utc>,
}

impl CellStats {
    /// The record a cell has before anything was merged into it.
    pub fn empty(key: &CellKey) -> Self {
        Self {
            model_id: key.model_id.clone(),
            project_id: key.project_id.clone(),
            latency_ms: None,
            status: CellStatus::Unknown,
            requests_in_session: 0,
            tokens_in_session: 0,
            last_check: DateTime::<Utc>::default(),
        }
    }
}

/// Fold one probe outcome into a cell's prior record.
pub fn merge(
    existing: Option<&CellStats>,
    key: &CellKey,
    outcome: ProbeOutcome,
    now: DateTime<Utc>,
) -> CellStats {
    let base = existing.cloned().unwrap_or_else(|| CellStats::empty(key));
    CellStats {
        status: outcome.status.into(),
        latency_ms: Some(outcome.latency_ms),
        last_check: now,
        requests_in_session: base.requests_in_session + 1,
        ..base
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Thread-safe map from cell to its statistics.
pub struct StatsTable {
    cells: RwLock<HashMap<CellKey, CellStats>>,
}

impl StatsTable {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    /// Merge an outcome into the cell. Read and write happen under one
    /// lock, so concurrent merges of the same key never lose an update.
    pub fn merge(&self, key: &CellKey, outcome: ProbeOutcome) -> CellStats {
        let mut cells = self.cells.write().unwrap();
        let merged = merge(cells.get(key), key, outcome, Utc::now());
        cells.insert(key.clone(), merged.clone());
        merged
    }

    pub fn get(&self, key: &CellKey) -> Option<CellStats> {
        self.cells.read().unwrap().get(key).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cells.read().unwrap().len()
    }

    /// Drop every cell belonging to `project_id`.
    pub fn remove_project(&self, project_id: &ProjectId) {
        self.cells
            .write()
            .unwrap()
            .retain(|key, _| &key.project_id != project_id);
    }

    /// Point-in-time copy of every populated cell.
    pub fn snapshot(&self) -> Vec<CellStats> {
        self.cells.read().unwrap().values().cloned().collect()
    }
}

impl Default for StatsTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key() -> CellKey {
        CellKey::new(ProjectId::from("p1"), "gemini-1.5-flash")
    }

    #[test]
    fn test_first_merge_creates_record() {
        let now = Utc::now();
        let stats = merge(None, &key(), ProbeOutcome::online(120), now);
        assert_eq!(stats.status, CellStatus::Online);
        assert_eq!(stats.latency_ms, Some(120));
        assert_eq!(stats.requests_in_session, 1);
        assert_eq!(stats.tokens_in_session, 0);
        assert_eq!(stats.last_check, now);
        assert_eq!(stats.model_id, "gemini-1.5-flash");
    }

    #[test]
    fn test_merge_overwrites_and_accumulates() {
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(5);
        let mut first = merge(None, &key(), ProbeOutcome::online(100), t0);
        first.tokens_in_session = 7;

        let second = merge(Some(&first), &key(), ProbeOutcome::offline(900), t1);
        assert_eq!(second.status, CellStatus::Offline);
        assert_eq!(second.latency_ms, Some(900));
        assert_eq!(second.last_check, t1);
        assert_eq!(second.requests_in_session, 2);
        assert_eq!(second.tokens_in_session, 7, "carried over untouched");
    }

    #[test]
    fn test_counter_is_order_independent() {
        let outcomes = [
            ProbeOutcome::online(10),
            ProbeOutcome::offline(20),
            ProbeOutcome::online(30),
            ProbeOutcome::online(40),
        ];
        let forward = outcomes.iter().fold(None, |acc: Option<CellStats>, o| {
            Some(merge(acc.as_ref(), &key(), *o, Utc::now()))
        });
        let backward = outcomes.iter().rev().fold(None, |acc: Option<CellStats>, o| {
            Some(merge(acc.as_ref(), &key(), *o, Utc::now()))
        });
        let forward = forward.unwrap();
        let backward = backward.unwrap();
        assert_eq!(forward.requests_in_session, 4);
        assert_eq!(backward.requests_in_session, 4);
        // Last write wins for latency.
        assert_eq!(forward.latency_ms, Some(40));
        assert_eq!(backward.latency_ms, Some(10));
    }

    #[test]
    fn test_table_merge_and_snapshot() {
        let table = StatsTable::new();
        assert!(table.get(&key()).is_none());

        table.merge(&key(), ProbeOutcome::online(50));
        table.merge(&key(), ProbeOutcome::online(70));
        let other = CellKey::new(ProjectId::from("p2"), "gemini-1.5-flash");
        table.merge(&other, ProbeOutcome::offline(5));

        assert_eq!(table.len(), 2);
        let stats = table.get(&key()).unwrap();
        assert_eq!(stats.requests_in_session, 2);
        assert_eq!(stats.latency_ms, Some(70));
        assert_eq!(table.snapshot().len(), 2);

        table.remove_project(&ProjectId::from("p1"));
        assert!(table.get(&key()).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_concurrent_merges_keep_exact_count() {
        let table = std::sync::Arc::new(StatsTable::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let table = std::sync::Arc::clone(&table);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        table.merge(&key(), ProbeOutcome::online(i * 100 + j));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(table.get(&key()).unwrap().requests_in_session, 400);
    }
}
