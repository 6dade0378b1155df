//! In-flight set: which cells are currently awaiting a probe.
//!
//! Membership is the only source of truth for "this cell is loading".
//! Entries are counted: two overlapping probes of the same cell keep it
//! in the set until the second one has merged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::stats::CellKey;

pub struct InFlightSet {
    cells: Mutex<HashMap<CellKey, usize>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    /// Mark the cell as in flight and return a guard that clears the mark
    /// when dropped, whether the probe merged, panicked, or was cancelled.
    pub fn enter(self: &Arc<Self>, key: CellKey) -> InFlightGuard {
        {
            let mut cells = self.cells.lock().unwrap();
            *cells.entry(key.clone()).or_insert(0) += 1;
        }
        InFlightGuard {
            set: Arc::clone(self),
            key,
        }
    }

    fn leave(&self, key: &CellKey) {
        let mut cells = self.cells.lock().unwrap();
        if let Some(count) = cells.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                cells.remove(key);
            }
        }
    }

    pub fn contains(&self, key: &CellKey) -> bool {
        self.cells.lock().unwrap().contains_key(key)
    }

    /// Number of distinct cells in flight.
    pub fn len(&self) -> usize {
        self.cells.lock().unwrap().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of probes in flight, counting overlaps on the same cell.
    #[cfg(test)]
    pub fn outstanding(&self) -> usize {
        self.cells.lock().unwrap().values().sum()
    }
}

impl Default for InFlightSet {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one in-flight mark for a cell.
pub struct InFlightGuard {
    set: Arc<InFlightSet>,
    key: CellKey,
}

impl InFlightGuard {
    pub fn key(&self) -> &CellKey {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.leave(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::ProjectId;

    fn key(model: &str) -> CellKey {
        CellKey::new(ProjectId::from("p1"), model)
    }

    #[test]
    fn test_guard_clears_on_drop() {
        let set = Arc::new(InFlightSet::new());
        let guard = set.enter(key("m1"));
        assert!(set.contains(&key("m1")));
        assert!(!set.contains(&key("m2")));
        drop(guard);
        assert!(set.is_empty());
    }

    #[test]
    fn test_overlapping_probes_keep_cell_loading() {
        let set = Arc::new(InFlightSet::new());
        let first = set.enter(key("m1"));
        let second = set.enter(key("m1"));
        assert_eq!(set.len(), 1);
        assert_eq!(set.outstanding(), 2);

        drop(first);
        assert!(set.contains(&key("m1")), "second probe still pending");
        drop(second);
        assert!(!set.contains(&key("m1")));
    }

    #[test]
    fn test_guard_clears_on_panic() {
        let set = Arc::new(InFlightSet::new());
        let inner = Arc::clone(&set);
        let result = std::thread::spawn(move || {
            let _guard = inner.enter(key("m1"));
            panic!("probe blew up");
        })
        .join();
        assert!(result.is_err());
        assert!(set.is_empty());
    }
}
