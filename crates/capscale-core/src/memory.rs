//! In-memory table and statistics backend.
//!
//! Backs the daemon's simulated mode and the test suites of the other
//! crates. The backend is `Clone` (shared `Arc` state), records every
//! update request it receives, and can be told to fail or stall specific
//! calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{StatisticsService, TableService};
use crate::types::{
    CapacityUpdateRequest, ConsumedDatapoint, Operation, ProvisionedCapacity, TableId, Timestamp,
};

#[derive(Default)]
struct Inner {
    tables: BTreeMap<TableId, ProvisionedCapacity>,
    datapoints: HashMap<(TableId, Operation), Vec<ConsumedDatapoint>>,
    updates: Vec<CapacityUpdateRequest>,
    list_failure: Option<RemoteError>,
    describe_failures: HashMap<TableId, RemoteError>,
    update_failures: HashMap<TableId, RemoteError>,
    statistics_failures: HashMap<TableId, RemoteError>,
    update_delay: Option<Duration>,
}

/// Thread-safe in-memory implementation of [`TableService`] and
/// [`StatisticsService`].
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a backend pre-populated with the given tables.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, ProvisionedCapacity)>,
        S: Into<TableId>,
    {
        let backend = Self::new();
        for (name, capacity) in tables {
            backend.put_table(name, capacity);
        }
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a table.
    pub fn put_table(&self, name: impl Into<TableId>, capacity: ProvisionedCapacity) {
        let name = name.into();
        debug!(table = %name, read = capacity.read, write = capacity.write, "table stored");
        self.lock().tables.insert(name, capacity);
    }

    pub fn remove_table(&self, name: &str) -> bool {
        self.lock().tables.remove(name).is_some()
    }

    /// Current capacity of a table, bypassing the service contract.
    pub fn capacity(&self, name: &str) -> Option<ProvisionedCapacity> {
        self.lock().tables.get(name).copied()
    }

    /// Every update request received so far, in arrival order.
    pub fn updates(&self) -> Vec<CapacityUpdateRequest> {
        self.lock().updates.clone()
    }

    /// Append a consumed-capacity datapoint for a table/operation.
    pub fn push_datapoint(&self, table: &str, operation: Operation, datapoint: ConsumedDatapoint) {
        self.lock()
            .datapoints
            .entry((table.to_string(), operation))
            .or_default()
            .push(datapoint);
    }

    pub fn fail_list(&self, error: Option<RemoteError>) {
        self.lock().list_failure = error;
    }

    pub fn fail_describe(&self, table: &str, error: RemoteError) {
        self.lock().describe_failures.insert(table.to_string(), error);
    }

    pub fn fail_update(&self, table: &str, error: RemoteError) {
        self.lock().update_failures.insert(table.to_string(), error);
    }

    pub fn fail_statistics(&self, table: &str, error: RemoteError) {
        self.lock()
            .statistics_failures
            .insert(table.to_string(), error);
    }

    /// Clear every injected failure.
    pub fn heal(&self) {
        let mut inner = self.lock();
        inner.list_failure = None;
        inner.describe_failures.clear();
        inner.update_failures.clear();
        inner.statistics_failures.clear();
    }

    /// Make every update call sleep before completing.
    pub fn set_update_delay(&self, delay: Option<Duration>) {
        self.lock().update_delay = delay;
    }
}

#[async_trait]
impl TableService for InMemoryBackend {
    async fn list_tables(&self) -> RemoteResult<Vec<TableId>> {
        let inner = self.lock();
        if let Some(err) = &inner.list_failure {
            return Err(err.clone());
        }
        Ok(inner.tables.keys().cloned().collect())
    }

    async fn describe_capacity(&self, table: &str) -> RemoteResult<ProvisionedCapacity> {
        let inner = self.lock();
        if let Some(err) = inner.describe_failures.get(table) {
            return Err(err.clone());
        }
        inner
            .tables
            .get(table)
            .copied()
            .ok_or_else(|| RemoteError::TableNotFound(table.to_string()))
    }

    async fn update_capacity(
        &self,
        table: &str,
        capacity: ProvisionedCapacity,
    ) -> RemoteResult<()> {
        let delay = self.lock().update_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        inner
            .updates
            .push(CapacityUpdateRequest::new(table, capacity));
        if let Some(err) = inner.update_failures.get(table) {
            return Err(err.clone());
        }
        if capacity.read == 0 || capacity.write == 0 {
            return Err(RemoteError::Rejected(format!(
                "capacity for {table} must be positive"
            )));
        }
        match inner.tables.get_mut(table) {
            Some(current) => {
                *current = capacity;
                debug!(%table, read = capacity.read, write = capacity.write, "capacity updated");
                Ok(())
            }
            None => Err(RemoteError::TableNotFound(table.to_string())),
        }
    }
}

#[async_trait]
impl StatisticsService for InMemoryBackend {
    async fn consumed_capacity(
        &self,
        table: &str,
        operation: Operation,
        start: Timestamp,
        end: Timestamp,
        _period_secs: u64,
    ) -> RemoteResult<Vec<ConsumedDatapoint>> {
        let inner = self.lock();
        if let Some(err) = inner.statistics_failures.get(table) {
            return Err(err.clone());
        }
        if !inner.tables.contains_key(table) {
            return Err(RemoteError::TableNotFound(table.to_string()));
        }
        let mut points: Vec<ConsumedDatapoint> = inner
            .datapoints
            .get(&(table.to_string(), operation))
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= start && p.timestamp <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}
