//! Check orchestrator: probes cells of the projects × models matrix.
//!
//! A check marks its cell in flight, awaits the gateway, merges the
//! outcome into the stats table and clears the mark. Fan-outs dispatch
//! every cell at once and return immediately; callers watch progress by
//! polling the in-flight set and the stats table. Probes of the same
//! cell are not serialized against each other.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::catalog::{self, ModelDescriptor};
use crate::gateway::{ProbeGateway, ProbeOutcome};
use crate::projects::kv::StoreError;
use crate::projects::{ProjectId, ProjectRecord, ProjectStore};

pub mod aggregate;
pub mod inflight;
pub mod rate_tracker;
pub mod stats;

use aggregate::{Scope, Summary};
use inflight::{InFlightGuard, InFlightSet};
use rate_tracker::{RateSnapshot, RateTracker};
use stats::{CellKey, CellStats, CellStatus, StatsTable};

/// How many probes may be on the wire at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyPolicy {
    /// Every dispatched probe runs immediately.
    #[default]
    Unbounded,
    /// At most `n` probes run; the rest wait for a slot while still
    /// showing as in flight.
    Bounded(usize),
}

#[derive(Debug, Clone, Default)]
pub struct CheckSettings {
    pub concurrency: ConcurrencyPolicy,
    /// When set, a probe that runs longer merges a synthetic offline
    /// result instead of leaving its cell checking forever.
    pub probe_timeout: Option<Duration>,
}

/// Everything a client needs to render one cell.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellView {
    pub project_id: ProjectId,
    pub model_id: String,
    pub checking: bool,
    /// `checking` while in flight, otherwise the last known status.
    pub status: CellStatus,
    pub stats: Option<CellStats>,
    pub session_usage_pct: Option<f32>,
}

#[derive(Clone)]
pub struct CheckOrchestrator {
    projects: Arc<ProjectStore>,
    gateway: Arc<dyn ProbeGateway>,
    stats: Arc<StatsTable>,
    in_flight: Arc<InFlightSet>,
    rate_tracker: Arc<RateTracker>,
    limiter: Option<Arc<Semaphore>>,
    probe_timeout: Option<Duration>,
}

impl CheckOrchestrator {
    pub fn new(
        projects: Arc<ProjectStore>,
        gateway: Arc<dyn ProbeGateway>,
        settings: CheckSettings,
    ) -> Self {
        let limiter = match settings.concurrency {
            ConcurrencyPolicy::Unbounded => None,
            ConcurrencyPolicy::Bounded(n) => Some(Arc::new(Semaphore::new(n.max(1)))),
        };

        Self {
            projects,
            gateway,
            stats: Arc::new(StatsTable::new()),
            in_flight: Arc::new(InFlightSet::new()),
            rate_tracker: Arc::new(RateTracker::new()),
            limiter,
            probe_timeout: settings.probe_timeout,
        }
    }

    // ── Checks ──

    /// Probe one cell and wait for its merge. Returns `None` without
    /// touching any state if the project doesn't exist.
    pub async fn check_cell(&self, model_id: &str, project_id: &ProjectId) -> Option<CellStats> {
        let project = self.projects.get(project_id)?;
        let guard = self.in_flight.enter(CellKey::new(project.id, model_id));
        Some(self.run_probe(guard, project.api_key).await)
    }

    /// Fire a probe for every catalog model against one project.
    /// Returns how many were dispatched; 0 for an unknown project.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn check_project(&self, project_id: &ProjectId) -> usize {
        match self.projects.get(project_id) {
            Some(project) => {
                let dispatched = self.dispatch_project(&project);
                info!(project_id = %project.id, dispatched, "Project check dispatched");
                dispatched
            }
            None => 0,
        }
    }

    /// Fire a probe for every project × catalog model.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn check_all(&self) -> usize {
        let projects = self.projects.list();
        let dispatched: usize = projects.iter().map(|p| self.dispatch_project(p)).sum();
        info!(projects = projects.len(), dispatched, "Global check dispatched");
        dispatched
    }

    fn dispatch_project(&self, project: &ProjectRecord) -> usize {
        for model in catalog::CORE_MODELS {
            let guard = self
                .in_flight
                .enter(CellKey::new(project.id.clone(), model.id));
            let this = self.clone();
            let credential = project.api_key.clone();
            tokio::spawn(async move {
                this.run_probe(guard, credential).await;
            });
        }
        catalog::CORE_MODELS.len()
    }

    /// Wait for a slot, probe, merge. The guard is released after the
    /// merge, or on unwind if anything below panics.
    async fn run_probe(&self, guard: InFlightGuard, credential: String) -> CellStats {
        let _permit = match &self.limiter {
            Some(sem) => sem.acquire().await.ok(),
            None => None,
        };

        let key = guard.key().clone();
        self.rate_tracker.record_probe(&key);
        let outcome = self.probe_once(&credential, &key.model_id).await;
        let merged = self.stats.merge(&key, outcome);
        if self.projects.get(&key.project_id).is_none() {
            // Project was removed while this probe was on the wire.
            self.forget(&key.project_id);
        }

        debug!(
            project_id = %key.project_id,
            model = %key.model_id,
            status = ?merged.status,
            latency_ms = outcome.latency_ms,
            requests = merged.requests_in_session,
            "Cell merged"
        );
        drop(guard);
        merged
    }

    // ── Projects ──

    /// Delete a project and every cell it had. Returns `false` if there
    /// was nothing to delete. Probes still in flight for it are dropped
    /// when they land.
    pub fn remove_project(&self, project_id: &ProjectId) -> Result<bool, StoreError> {
        let removed = self.projects.remove(project_id)?;
        if removed {
            self.forget(project_id);
        }
        Ok(removed)
    }

    fn forget(&self, project_id: &ProjectId) {
        self.stats.remove_project(project_id);
        self.rate_tracker.remove_project(project_id);
    }

    async fn probe_once(&self, credential: &str, model_id: &str) -> ProbeOutcome {
        let probe = self.gateway.probe(credential, model_id);
        match self.probe_timeout {
            None => probe.await,
            Some(limit) => match tokio::time::timeout(limit, probe).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        model = model_id,
                        timeout_ms = limit.as_millis() as u64,
                        "Probe timed out, recording offline"
                    );
                    ProbeOutcome::offline(limit.as_millis() as u64)
                }
            },
        }
    }

    // ── Reads ──

    pub fn is_checking(&self, key: &CellKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Number of distinct cells waiting on a probe.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    #[cfg(test)]
    pub fn cell_stats(&self, key: &CellKey) -> Option<CellStats> {
        self.stats.get(key)
    }

    pub fn cell(&self, key: &CellKey) -> CellView {
        let checking = self.is_checking(key);
        let stats = self.stats.get(key);
        let status = if checking {
            CellStatus::Checking
        } else {
            stats.as_ref().map(|s| s.status).unwrap_or(CellStatus::Unknown)
        };
        let session_usage_pct = catalog::get_model(&key.model_id)
            .map(|m| aggregate::session_usage_pct(stats.as_ref(), m));

        CellView {
            project_id: key.project_id.clone(),
            model_id: key.model_id.clone(),
            checking,
            status,
            stats,
            session_usage_pct,
        }
    }

    /// Every project × model cell, probed or not, in display order.
    /// `project` narrows it to one row and `models` to a set of columns.
    pub fn matrix(
        &self,
        project: Option<&ProjectId>,
        models: &[&ModelDescriptor],
    ) -> Vec<CellView> {
        self.projects
            .list()
            .into_iter()
            .filter(|p| project.map_or(true, |id| &p.id == id))
            .flat_map(|p| {
                models
                    .iter()
                    .map(|m| self.cell(&CellKey::new(p.id.clone(), m.id)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<CellStats> {
        self.stats.snapshot()
    }

    /// Summary over cells of projects that still exist.
    pub fn summary(&self, scope: &Scope) -> Summary {
        let live: HashSet<ProjectId> = self.projects.list().into_iter().map(|p| p.id).collect();
        let cells: Vec<CellStats> = self
            .stats
            .snapshot()
            .into_iter()
            .filter(|c| live.contains(&c.project_id))
            .collect();
        aggregate::summarize(&cells, scope)
    }

    pub fn rate_snapshot(&self) -> Vec<RateSnapshot> {
        self.rate_tracker.snapshot()
    }
}
