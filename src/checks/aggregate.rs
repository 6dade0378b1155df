//! Aggregator: summary metrics over a snapshot of the stats table.

use serde::Serialize;

use super::stats::{CellStats, CellStatus};
use crate::catalog::ModelDescriptor;
use crate::projects::ProjectId;

/// Which cells a summary covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Project(ProjectId),
    Model(String),
}

impl Scope {
    pub fn contains(&self, cell: &CellStats) -> bool {
        match self {
            Scope::All => true,
            Scope::Project(id) => &cell.project_id == id,
            Scope::Model(id) => &cell.model_id == id,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Populated cells in scope.
    pub cells: usize,
    pub online: usize,
    /// Mean latency of probed cells, rounded to the millisecond.
    pub avg_latency_ms: u64,
    pub total_requests: u64,
    pub total_tokens: u64,
}

/// Summarize the cells that fall inside `scope`.
///
/// Cells without a latency are left out of the mean rather than counted
/// as zero; an empty scope yields all zeros.
pub fn summarize(cells: &[CellStats], scope: &Scope) -> Summary {
    let mut summary = Summary::default();
    let mut latency_sum = 0u64;
    let mut latency_count = 0u64;

    for cell in cells.iter().filter(|c| scope.contains(c)) {
        summary.cells += 1;
        if cell.status == CellStatus::Online {
            summary.online += 1;
        }
        if let Some(latency) = cell.latency_ms {
            latency_sum += latency;
            latency_count += 1;
        }
        summary.total_requests += cell.requests_in_session;
        summary.total_tokens += cell.tokens_in_session;
    }

    if latency_count > 0 {
        summary.avg_latency_ms = (latency_sum as f64 / latency_count as f64).round() as u64;
    }
    summary
}

/// Share of the model's free-tier RPM used by this session, capped at 100.
pub fn session_usage_pct(cell: Option<&CellStats>, model: &ModelDescriptor) -> f32 {
    let requests = cell.map(|c| c.requests_in_session).unwrap_or(0);
    if model.rpm_limit_free == 0 {
        return 0.0;
    }
    let pct = requests as f32 / model.rpm_limit_free as f32 * 100.0;
    pct.min(100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::checks::stats::CellKey;

    fn cell(project: &str, model: &str, status: CellStatus, latency: Option<u64>, requests: u64) -> CellStats {
        let key = CellKey::new(ProjectId::from(project), model);
        CellStats {
            status,
            latency_ms: latency,
            requests_in_session: requests,
            ..CellStats::empty(&key)
        }
    }

    #[test]
    fn test_empty_scope_is_all_zero() {
        let summary = summarize(&[], &Scope::All);
        assert_eq!(summary, Summary::default());
        assert_eq!(summary.avg_latency_ms, 0);

        let cells = vec![cell("p1", "m1", CellStatus::Online, Some(10), 1)];
        let other = summarize(&cells, &Scope::Project(ProjectId::from("p2")));
        assert_eq!(other, Summary::default());
    }

    #[test]
    fn test_unprobed_cells_excluded_from_mean() {
        let cells = vec![
            cell("p1", "m1", CellStatus::Online, Some(100), 1),
            cell("p1", "m2", CellStatus::Offline, Some(300), 1),
            cell("p1", "m3", CellStatus::Unknown, None, 0),
        ];
        let summary = summarize(&cells, &Scope::Project(ProjectId::from("p1")));
        assert_eq!(summary.avg_latency_ms, 200);
        assert_eq!(summary.cells, 3);
        assert_eq!(summary.online, 1);
        assert_eq!(summary.total_requests, 2);
    }

    #[test]
    fn test_scopes_filter_cells() {
        let cells = vec![
            cell("p1", "m1", CellStatus::Online, Some(100), 3),
            cell("p2", "m1", CellStatus::Online, Some(201), 2),
            cell("p2", "m2", CellStatus::Offline, Some(50), 4),
        ];

        let all = summarize(&cells, &Scope::All);
        assert_eq!(all.online, 2);
        assert_eq!(all.total_requests, 9);
        assert_eq!(all.avg_latency_ms, 117);

        let column = summarize(&cells, &Scope::Model("m1".into()));
        assert_eq!(column.cells, 2);
        // (100 + 201) / 2 = 150.5 rounds up
        assert_eq!(column.avg_latency_ms, 151);

        let row = summarize(&cells, &Scope::Project(ProjectId::from("p2")));
        assert_eq!(row.online, 1);
        assert_eq!(row.total_requests, 6);
    }

    #[test]
    fn test_session_usage_pct_caps_at_100() {
        let model = catalog::get_model("gemini-1.5-pro").unwrap(); // 2 rpm free
        assert_eq!(session_usage_pct(None, model), 0.0);
        let one = cell("p1", model.id, CellStatus::Online, Some(1), 1);
        assert_eq!(session_usage_pct(Some(&one), model), 50.0);
        let many = cell("p1", model.id, CellStatus::Online, Some(1), 9);
        assert_eq!(session_usage_pct(Some(&many), model), 100.0);
    }
}
