//! In-memory rate tracker: RPM/RPD accounting of probes per cell.
//!
//! Every dispatched probe is a real request against the project's quota.
//! This tracks how many went out in the last minute and today, so the
//! dashboard can show them next to the catalog's declared free-tier
//! limits. Nothing is throttled here; quotas are the remote side's job.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;

use super::stats::CellKey;
use crate::catalog;
use crate::projects::ProjectId;

/// Sliding-window counters for a single cell.
struct RateWindow {
    /// Timestamps of probes in the last 60 seconds
    minute_window: VecDeque<Instant>,
    /// Probes sent today (resets at UTC midnight)
    daily_count: u32,
    daily_reset_day: u32,
}

impl RateWindow {
    fn new() -> Self {
        Self {
            minute_window: VecDeque::new(),
            daily_count: 0,
            daily_reset_day: current_day(),
        }
    }

    fn record(&mut self) {
        let now = Instant::now();
        self.minute_window.push_back(now);
        self.prune_minute_window(now);
        self.roll_day();
        self.daily_count += 1;
    }

    fn current_rpm(&mut self) -> u32 {
        self.prune_minute_window(Instant::now());
        self.minute_window.len() as u32
    }

    fn current_rpd(&mut self) -> u32 {
        self.roll_day();
        self.daily_count
    }

    fn roll_day(&mut self) {
        let today = current_day();
        if today != self.daily_reset_day {
            self.daily_count = 0;
            self.daily_reset_day = today;
        }
    }

    fn prune_minute_window(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(Duration::from_secs(60)) else {
            return;
        };
        while let Some(&front) = self.minute_window.front() {
            if front < cutoff {
                self.minute_window.pop_front();
            } else {
                break;
            }
        }
    }
}

fn current_day() -> u32 {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() / 86400) as u32
}

// ── Public API ──────────────────────────────────────────────────────

pub struct RateTracker {
    windows: RwLock<HashMap<CellKey, RateWindow>>,
}

impl RateTracker {
    pub fn new() -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Record that a probe was sent for this cell.
    pub fn record_probe(&self, key: &CellKey) {
        let mut map = self.windows.write().unwrap();
        map.entry(key.clone())
            .or_insert_with(RateWindow::new)
            .record();
    }

    /// Current `(rpm, rpd)` for a cell.
    #[cfg(test)]
    pub fn current(&self, key: &CellKey) -> (u32, u32) {
        let mut map = self.windows.write().unwrap();
        match map.get_mut(key) {
            Some(window) => (window.current_rpm(), window.current_rpd()),
            None => (0, 0),
        }
    }

    /// Stop tracking every cell of `project_id`.
    pub fn remove_project(&self, project_id: &ProjectId) {
        self.windows
            .write()
            .unwrap()
            .retain(|key, _| &key.project_id != project_id);
    }

    /// Snapshot of every tracked cell, with utilization against the
    /// catalog's free-tier limits when the model is known.
    pub fn snapshot(&self) -> Vec<RateSnapshot> {
        let mut map = self.windows.write().unwrap();
        let mut snaps: Vec<RateSnapshot> = map
            .iter_mut()
            .map(|(key, window)| {
                let current_rpm = window.current_rpm();
                let current_rpd = window.current_rpd();
                let model = catalog::get_model(&key.model_id);
                RateSnapshot {
                    project_id: key.project_id.clone(),
                    model_id: key.model_id.clone(),
                    current_rpm,
                    current_rpd,
                    rpm_limit: model.map(|m| m.rpm_limit_free),
                    rpd_limit: model.map(|m| m.rpd_limit_free),
                    rpm_utilization_pct: model
                        .map(|m| utilization(current_rpm, m.rpm_limit_free)),
                    rpd_utilization_pct: model
                        .map(|m| utilization(current_rpd, m.rpd_limit_free)),
                }
            })
            .collect();
        snaps.sort_by(|a, b| {
            a.project_id
                .cmp(&b.project_id)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });
        snaps
    }
}

impl Default for RateTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn utilization(used: u32, limit: u32) -> f32 {
    if limit == 0 {
        return 0.0;
    }
    let pct = used as f32 / limit as f32 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// A point-in-time view of probe volume for one cell.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSnapshot {
    pub project_id: ProjectId,
    pub model_id: String,
    pub current_rpm: u32,
    pub current_rpd: u32,
    pub rpm_limit: Option<u32>,
    pub rpd_limit: Option<u32>,
    pub rpm_utilization_pct: Option<f32>,
    pub rpd_utilization_pct: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(project: &str, model: &str) -> CellKey {
        CellKey::new(ProjectId::from(project), model)
    }

    #[test]
    fn test_record_and_read() {
        let tracker = RateTracker::new();
        assert_eq!(tracker.current(&key("p1", "m1")), (0, 0));

        tracker.record_probe(&key("p1", "m1"));
        tracker.record_probe(&key("p1", "m1"));
        assert_eq!(tracker.current(&key("p1", "m1")), (2, 2));
        assert_eq!(tracker.current(&key("p2", "m1")), (0, 0));

        tracker.remove_project(&ProjectId::from("p1"));
        assert_eq!(tracker.current(&key("p1", "m1")), (0, 0));
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn test_snapshot_reports_catalog_limits() {
        let tracker = RateTracker::new();
        tracker.record_probe(&key("p1", "gemini-1.5-pro"));
        tracker.record_probe(&key("p1", "not-in-catalog"));

        let snap = tracker.snapshot();
        assert_eq!(snap.len(), 2);

        let pro = snap.iter().find(|s| s.model_id == "gemini-1.5-pro").unwrap();
        assert_eq!(pro.rpm_limit, Some(2));
        assert_eq!(pro.rpm_utilization_pct, Some(50.0));
        assert_eq!(pro.rpd_utilization_pct, Some(2.0));

        let unknown = snap.iter().find(|s| s.model_id == "not-in-catalog").unwrap();
        assert_eq!(unknown.rpm_limit, None);
        assert_eq!(unknown.current_rpm, 1);
    }

    #[test]
    fn test_utilization_rounding() {
        assert_eq!(utilization(1, 3), 33.3);
        assert_eq!(utilization(5, 0), 0.0);
    }
}
