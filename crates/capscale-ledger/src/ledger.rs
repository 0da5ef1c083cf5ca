//! Exception ledger — per-table, per-operation event windows.
//!
//! The table map sits behind a `RwLock` that is only write-locked when a
//! table is added or removed. Each (table, operation) window has its own
//! mutex, so appends for one key never wait on a trim of another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tracing::debug;

use capscale_core::{Operation, TableId, Timestamp};

/// Both windows of a single table.
#[derive(Default)]
struct TableWindows {
    read: Mutex<VecDeque<Timestamp>>,
    write: Mutex<VecDeque<Timestamp>>,
}

impl TableWindows {
    fn lock(&self, operation: Operation) -> MutexGuard<'_, VecDeque<Timestamp>> {
        let window = match operation {
            Operation::Read => &self.read,
            Operation::Write => &self.write,
        };
        window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Number of events currently held for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowSizes {
    pub table: TableId,
    pub read: usize,
    pub write: usize,
}

/// Append-only store of throttling exception timestamps.
#[derive(Default)]
pub struct ExceptionLedger {
    /// table → windows.
    windows: RwLock<HashMap<TableId, Arc<TableWindows>>>,
}

impl ExceptionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, table: &str) -> Option<Arc<TableWindows>> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows.get(table).cloned()
    }

    fn get_or_create(&self, table: &str) -> Arc<TableWindows> {
        if let Some(w) = self.get(table) {
            return w;
        }
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        windows
            .entry(table.to_string())
            .or_insert_with(|| Arc::new(TableWindows::default()))
            .clone()
    }

    /// Record one exception. Never fails; unknown keys are created.
    pub fn append(&self, table: &str, operation: Operation, timestamp: Timestamp) {
        self.get_or_create(table).lock(operation).push_back(timestamp);
    }

    /// Record one exception only if `table` is already tracked.
    ///
    /// Returns false, and creates nothing, when the table is unknown.
    pub fn append_existing(&self, table: &str, operation: Operation, timestamp: Timestamp) -> bool {
        match self.get(table) {
            Some(w) => {
                w.lock(operation).push_back(timestamp);
                true
            }
            None => false,
        }
    }

    /// Copy of the current window contents in arrival order.
    pub fn snapshot(&self, table: &str, operation: Operation) -> Vec<Timestamp> {
        match self.get(table) {
            Some(w) => w.lock(operation).iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Remove every entry strictly older than `cutoff`.
    ///
    /// Returns the number of entries removed.
    pub fn trim(&self, table: &str, operation: Operation, cutoff: Timestamp) -> usize {
        match self.get(table) {
            Some(w) => retain_from(&mut w.lock(operation), cutoff),
            None => 0,
        }
    }

    /// Snapshot and trim a window under a single lock acquisition.
    ///
    /// The snapshot holds everything appended before the call; anything
    /// appended afterwards is left for the next tick.
    pub fn snapshot_and_trim(
        &self,
        table: &str,
        operation: Operation,
        cutoff: Timestamp,
    ) -> Vec<Timestamp> {
        let Some(w) = self.get(table) else {
            return Vec::new();
        };
        let mut window = w.lock(operation);
        let snapshot: Vec<Timestamp> = window.iter().copied().collect();
        retain_from(&mut window, cutoff);
        snapshot
    }

    /// Number of events currently held for a key.
    pub fn len(&self, table: &str, operation: Operation) -> usize {
        self.get(table).map(|w| w.lock(operation).len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        windows
            .values()
            .all(|w| Operation::ALL.iter().all(|op| w.lock(*op).is_empty()))
    }

    /// Register a table with empty windows (no-op when already present).
    pub fn register(&self, table: &str) {
        self.get_or_create(table);
        debug!(%table, "registered for exception tracking");
    }

    /// Drop a table and everything recorded for it.
    pub fn unregister(&self, table: &str) -> bool {
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);
        let removed = windows.remove(table).is_some();
        if removed {
            debug!(%table, "unregistered from exception tracking");
        }
        removed
    }

    /// Make the tracked table set match `tables`.
    ///
    /// New tables get empty windows, tables no longer listed are dropped.
    /// Returns `(added, removed)` counts.
    pub fn sync_tables(&self, tables: &[TableId]) -> (usize, usize) {
        let wanted: HashSet<&str> = tables.iter().map(String::as_str).collect();
        let mut windows = self.windows.write().unwrap_or_else(PoisonError::into_inner);

        let before = windows.len();
        windows.retain(|name, _| wanted.contains(name.as_str()));
        let removed = before - windows.len();

        let mut added = 0;
        for table in tables {
            if !windows.contains_key(table) {
                windows.insert(table.clone(), Arc::new(TableWindows::default()));
                added += 1;
            }
        }

        if added > 0 || removed > 0 {
            debug!(added, removed, tracked = windows.len(), "ledger tables synced");
        }
        (added, removed)
    }

    pub fn contains_table(&self, table: &str) -> bool {
        self.get(table).is_some()
    }

    /// All tracked tables, sorted.
    pub fn tables(&self) -> Vec<TableId> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        let mut tables: Vec<TableId> = windows.keys().cloned().collect();
        tables.sort();
        tables
    }

    /// Current window sizes for every tracked table, sorted by table.
    pub fn window_sizes(&self) -> Vec<WindowSizes> {
        let windows = self.windows.read().unwrap_or_else(PoisonError::into_inner);
        let mut sizes: Vec<WindowSizes> = windows
            .iter()
            .map(|(table, w)| WindowSizes {
                table: table.clone(),
                read: w.lock(Operation::Read).len(),
                write: w.lock(Operation::Write).len(),
            })
            .collect();
        sizes.sort_by(|a, b| a.table.cmp(&b.table));
        sizes
    }
}

fn retain_from(window: &mut VecDeque<Timestamp>, cutoff: Timestamp) -> usize {
    let before = window.len();
    window.retain(|ts| *ts >= cutoff);
    before - window.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_returns_appends_in_arrival_order() {
        let ledger = ExceptionLedger::new();
        let stamps = [50, 10, 30, 30, 20];
        for ts in stamps {
            ledger.append("Orders", Operation::Write, ts);
        }
        assert_eq!(ledger.snapshot("Orders", Operation::Write), stamps.to_vec());
        assert!(ledger.snapshot("Orders", Operation::Read).is_empty());
    }

    #[test]
    fn snapshot_does_not_mutate() {
        let ledger = ExceptionLedger::new();
        ledger.append("Orders", Operation::Read, 1);
        let _ = ledger.snapshot("Orders", Operation::Read);
        assert_eq!(ledger.len("Orders", Operation::Read), 1);
    }

    #[test]
    fn trim_removes_only_strictly_older_entries() {
        let ledger = ExceptionLedger::new();
        for ts in [5, 9, 10, 11, 3, 10] {
            ledger.append("Orders", Operation::Write, ts);
        }
        let removed = ledger.trim("Orders", Operation::Write, 10);
        assert_eq!(removed, 3);
        let remaining = ledger.snapshot("Orders", Operation::Write);
        assert_eq!(remaining, vec![10, 11, 10]);
        assert!(remaining.iter().all(|ts| *ts >= 10));
    }

    #[test]
    fn trim_unknown_key_is_noop() {
        let ledger = ExceptionLedger::new();
        assert_eq!(ledger.trim("Missing", Operation::Read, 100), 0);
    }

    #[test]
    fn snapshot_and_trim_keeps_window() {
        let ledger = ExceptionLedger::new();
        for ts in [100, 200, 300] {
            ledger.append("Feed", Operation::Read, ts);
        }
        let snap = ledger.snapshot_and_trim("Feed", Operation::Read, 200);
        assert_eq!(snap, vec![100, 200, 300]);
        assert_eq!(ledger.snapshot("Feed", Operation::Read), vec![200, 300]);
    }

    #[test]
    fn keys_are_independent() {
        let ledger = ExceptionLedger::new();
        ledger.append("A", Operation::Read, 1);
        ledger.append("A", Operation::Write, 2);
        ledger.append("B", Operation::Read, 3);
        ledger.trim("A", Operation::Read, 10);
        assert!(ledger.snapshot("A", Operation::Read).is_empty());
        assert_eq!(ledger.snapshot("A", Operation::Write), vec![2]);
        assert_eq!(ledger.snapshot("B", Operation::Read), vec![3]);
    }

    #[test]
    fn sync_tables_adds_and_drops() {
        let ledger = ExceptionLedger::new();
        ledger.append("Old", Operation::Read, 1);
        ledger.register("Keep");

        let (added, removed) = ledger.sync_tables(&["Keep".to_string(), "New".to_string()]);
        assert_eq!((added, removed), (1, 1));
        assert_eq!(ledger.tables(), vec!["Keep".to_string(), "New".to_string()]);
        assert!(!ledger.contains_table("Old"));
        assert!(ledger.is_empty());
    }

    #[test]
    fn window_sizes_reports_per_operation() {
        let ledger = ExceptionLedger::new();
        ledger.append("Orders", Operation::Read, 1);
        ledger.append("Orders", Operation::Write, 1);
        ledger.append("Orders", Operation::Write, 2);
        assert_eq!(
            ledger.window_sizes(),
            vec![WindowSizes {
                table: "Orders".into(),
                read: 1,
                write: 2
            }]
        );
    }

    #[test]
    fn unregister_drops_events() {
        let ledger = ExceptionLedger::new();
        ledger.append("Orders", Operation::Read, 1);
        assert!(ledger.unregister("Orders"));
        assert!(!ledger.unregister("Orders"));
        assert_eq!(ledger.len("Orders", Operation::Read), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_during_trim_are_not_lost() {
        let ledger = Arc::new(ExceptionLedger::new());
        ledger.register("Orders");

        let mut handles = Vec::new();
        for worker in 0..4u64 {
            let ledger = Arc::clone(&ledger);
            handles.push(tokio::spawn(async move {
                for i in 0..500u64 {
                    // All appended timestamps sit at or above the cutoff.
                    ledger.append("Orders", Operation::Write, 1_000 + worker * 1_000 + i);
                    tokio::task::yield_now().await;
                }
            }));
        }
        let trimmer = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                for _ in 0..200 {
                    ledger.trim("Orders", Operation::Write, 1_000);
                    tokio::task::yield_now().await;
                }
            })
        };

        for h in handles {
            h.await.unwrap();
        }
        trimmer.await.unwrap();

        assert_eq!(ledger.len("Orders", Operation::Write), 2_000);
    }

    #[test]
    fn append_existing_never_creates_tables() {
        let ledger = ExceptionLedger::new();
        assert!(!ledger.append_existing("Ghost", Operation::Read, 1));
        assert!(!ledger.contains_table("Ghost"));

        ledger.register("Orders");
        assert!(ledger.append_existing("Orders", Operation::Read, 1));
        assert_eq!(ledger.snapshot("Orders", Operation::Read), vec![1]);

        ledger.sync_tables(&[]);
        assert!(!ledger.append_existing("Orders", Operation::Read, 2));
        assert!(ledger.tables().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn appends_during_snapshot_and_trim_are_kept_for_next_tick() {
        const CUTOFF: Timestamp = 1_000;
        let ledger = Arc::new(ExceptionLedger::new());
        ledger.register("Orders");

        let mut writers = Vec::new();
        for worker in 0..4u64 {
            let ledger = Arc::clone(&ledger);
            writers.push(tokio::spawn(async move {
                for i in 0..500u64 {
                    // Distinct stamps at or above the cutoff, plus stale ones below it.
                    ledger.append("Orders", Operation::Write, CUTOFF + worker * 1_000 + i);
                    if i % 5 == 0 {
                        ledger.append("Orders", Operation::Write, i % CUTOFF);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        let ticker = {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let mut seen = HashSet::new();
                for _ in 0..200 {
                    let snapshot = ledger.snapshot_and_trim("Orders", Operation::Write, CUTOFF);
                    seen.extend(snapshot.into_iter().filter(|ts| *ts >= CUTOFF));
                    tokio::task::yield_now().await;
                }
                seen
            })
        };

        for w in writers {
            w.await.unwrap();
        }
        let mut seen = ticker.await.unwrap();
        let last = ledger.snapshot_and_trim("Orders", Operation::Write, CUTOFF);
        seen.extend(last.iter().copied().filter(|ts| *ts >= CUTOFF));

        let remaining = ledger.snapshot("Orders", Operation::Write);
        assert_eq!(remaining.len(), 2_000);
        assert!(remaining.iter().all(|ts| *ts >= CUTOFF));
        assert_eq!(seen.len(), 2_000);
        for worker in 0..4u64 {
            for i in 0..500u64 {
                let ts = CUTOFF + worker * 1_000 + i;
                assert!(seen.contains(&ts) && remaining.contains(&ts), "lost {ts}");
            }
        }
    }
}
