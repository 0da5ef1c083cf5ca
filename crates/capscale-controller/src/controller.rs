//! Capacity controller — the only component that changes capacity.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use capscale_core::{
    CapacityUpdateRequest, Operation, ProvisionedCapacity, RemoteResult, ScaleRecommendation,
    TableId, TableService,
};

use crate::error::ControllerError;

/// Result of one `apply` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleOutcome {
    /// Delta was zero; nothing to do.
    Skipped { table: TableId, operation: Operation },
    /// Another update for the table was still outstanding.
    AlreadyInFlight {
        table: TableId,
        operation: Operation,
        delta: u64,
    },
    /// The configured ceiling leaves no room to grow.
    AtCeiling {
        table: TableId,
        operation: Operation,
        capacity: u64,
    },
    /// The update was accepted by the table service.
    Applied {
        operation: Operation,
        previous: ProvisionedCapacity,
        request: CapacityUpdateRequest,
    },
    /// A remote call failed or timed out.
    Failed {
        table: TableId,
        operation: Operation,
        error: ControllerError,
    },
}

impl ScaleOutcome {
    pub fn table(&self) -> &str {
        match self {
            ScaleOutcome::Skipped { table, .. }
            | ScaleOutcome::AlreadyInFlight { table, .. }
            | ScaleOutcome::AtCeiling { table, .. }
            | ScaleOutcome::Failed { table, .. } => table,
            ScaleOutcome::Applied { request, .. } => &request.table,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ScaleOutcome::Applied { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScaleOutcome::Failed { .. })
    }
}

type InFlightSet = Arc<Mutex<HashSet<TableId>>>;

fn lock_set(set: &InFlightSet) -> MutexGuard<'_, HashSet<TableId>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive claim on a table's update slot. Released on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    table: TableId,
    set: InFlightSet,
}

impl InFlightGuard {
    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock_set(&self.set).remove(&self.table);
        debug!(table = %self.table, "update slot released");
    }
}

/// Issues capacity updates with at-most-one in flight per table.
#[derive(Clone)]
pub struct CapacityController {
    tables: Arc<dyn TableService>,
    in_flight: InFlightSet,
    call_timeout: Duration,
    max_capacity: Option<u64>,
}

impl CapacityController {
    pub fn new(tables: Arc<dyn TableService>, call_timeout: Duration) -> Self {
        Self {
            tables,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            call_timeout,
            max_capacity: None,
        }
    }

    /// Never raise any operation's capacity above `max`.
    pub fn with_max_capacity(mut self, max: Option<u64>) -> Self {
        self.max_capacity = max;
        self
    }

    /// Claim the update slot for `table`, or `None` when it is taken.
    pub fn try_begin(&self, table: &str) -> Option<InFlightGuard> {
        let mut set = lock_set(&self.in_flight);
        if !set.insert(table.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            table: table.to_string(),
            set: Arc::clone(&self.in_flight),
        })
    }

    pub fn is_in_flight(&self, table: &str) -> bool {
        lock_set(&self.in_flight).contains(table)
    }

    /// Tables with an outstanding update, sorted.
    pub fn in_flight_tables(&self) -> Vec<TableId> {
        let mut tables: Vec<TableId> = lock_set(&self.in_flight).iter().cloned().collect();
        tables.sort();
        tables
    }

    pub async fn apply_recommendation(&self, rec: &ScaleRecommendation) -> ScaleOutcome {
        self.apply(&rec.table, rec.operation, rec.delta).await
    }

    /// Raise `operation` capacity of `table` by `delta`.
    pub async fn apply(&self, table: &str, operation: Operation, delta: u64) -> ScaleOutcome {
        if delta == 0 {
            debug!(%table, %operation, "zero delta, skipping");
            return ScaleOutcome::Skipped {
                table: table.to_string(),
                operation,
            };
        }
        match self.try_begin(table) {
            Some(guard) => self.apply_claimed(guard, operation, delta).await,
            None => {
                info!(%table, %operation, delta, "update already in flight, dropping recommendation");
                ScaleOutcome::AlreadyInFlight {
                    table: table.to_string(),
                    operation,
                    delta,
                }
            }
        }
    }

    /// Run an update for a slot the caller already holds.
    ///
    /// The slot is released when this future completes or is dropped.
    pub async fn apply_claimed(
        &self,
        guard: InFlightGuard,
        operation: Operation,
        delta: u64,
    ) -> ScaleOutcome {
        let table = guard.table.clone();
        self.apply_claimed_many(guard, &[(operation, delta)])
            .await
            .pop()
            .unwrap_or(ScaleOutcome::Skipped { table, operation })
    }

    /// Raise several operations of the guarded table in one update.
    ///
    /// Capacity is described once and written once; operations not listed
    /// keep their current value. Returns one outcome per listed operation.
    pub async fn apply_claimed_many(
        &self,
        guard: InFlightGuard,
        raises: &[(Operation, u64)],
    ) -> Vec<ScaleOutcome> {
        let table = guard.table.clone();
        let outcomes = self.raise(&table, raises).await;
        drop(guard);

        for outcome in &outcomes {
            match outcome {
                ScaleOutcome::Applied {
                    operation,
                    previous,
                    request,
                } => info!(
                    %table,
                    %operation,
                    from = previous.get(*operation),
                    to = request.capacity().get(*operation),
                    "capacity raised"
                ),
                ScaleOutcome::AtCeiling {
                    operation,
                    capacity,
                    ..
                } => {
                    warn!(%table, %operation, capacity, "capacity ceiling reached, not scaling")
                }
                ScaleOutcome::Failed {
                    operation, error, ..
                } => {
                    warn!(%table, %operation, error = %error, "capacity update failed")
                }
                _ => {}
            }
        }
        outcomes
    }

    async fn raise(&self, table: &str, raises: &[(Operation, u64)]) -> Vec<ScaleOutcome> {
        let mut outcomes = Vec::with_capacity(raises.len());
        let mut pending: Vec<(Operation, u64)> = Vec::new();
        for &(operation, delta) in raises {
            if delta == 0 {
                outcomes.push(ScaleOutcome::Skipped {
                    table: table.to_string(),
                    operation,
                });
            } else {
                pending.push((operation, delta));
            }
        }
        if pending.is_empty() {
            return outcomes;
        }

        let failed = |operation, error: ControllerError| ScaleOutcome::Failed {
            table: table.to_string(),
            operation,
            error,
        };

        let current = match self
            .bounded("describe_capacity", self.tables.describe_capacity(table))
            .await
        {
            Ok(Ok(capacity)) => capacity,
            Ok(Err(e)) => {
                let error = ControllerError::Describe(e);
                outcomes.extend(pending.iter().map(|(op, _)| failed(*op, error.clone())));
                return outcomes;
            }
            Err(timeout) => {
                outcomes.extend(pending.iter().map(|(op, _)| failed(*op, timeout.clone())));
                return outcomes;
            }
        };

        let mut updated = current;
        let mut raised = Vec::new();
        for (operation, delta) in pending {
            let value = updated.get(operation);
            let mut target = value.saturating_add(delta);
            if let Some(max) = self.max_capacity {
                target = target.min(max);
            }
            if target <= value {
                outcomes.push(ScaleOutcome::AtCeiling {
                    table: table.to_string(),
                    operation,
                    capacity: value,
                });
                continue;
            }
            updated = updated.with(operation, target);
            if !raised.contains(&operation) {
                raised.push(operation);
            }
        }
        if raised.is_empty() {
            return outcomes;
        }

        debug!(%table, read = updated.read, write = updated.write, "sending capacity update");
        match self
            .bounded("update_capacity", self.tables.update_capacity(table, updated))
            .await
        {
            Ok(Ok(())) => outcomes.extend(raised.into_iter().map(|operation| {
                ScaleOutcome::Applied {
                    operation,
                    previous: current,
                    request: CapacityUpdateRequest::new(table, updated),
                }
            })),
            Ok(Err(e)) => {
                let error = ControllerError::Update(e);
                outcomes.extend(raised.into_iter().map(|op| failed(op, error.clone())));
            }
            Err(timeout) => {
                outcomes.extend(raised.into_iter().map(|op| failed(op, timeout.clone())));
            }
        }
        outcomes
    }

    async fn bounded<T>(
        &self,
        call: &'static str,
        fut: impl Future<Output = RemoteResult<T>>,
    ) -> Result<RemoteResult<T>, ControllerError> {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| ControllerError::Timeout {
                call,
                after: self.call_timeout,
            })
    }
}
