//! Contracts for the remote services capscale consumes.
//!
//! The transport behind these traits is up to the implementor. The engine
//! only relies on the call semantics documented here; every call may
//! suspend and may fail with a [`RemoteError`].

use async_trait::async_trait;

use crate::error::RemoteResult;
use crate::types::{ConsumedDatapoint, Operation, ProvisionedCapacity, TableId, Timestamp};

/// Storage table management API.
#[async_trait]
pub trait TableService: Send + Sync {
    /// List every table the engine should watch.
    async fn list_tables(&self) -> RemoteResult<Vec<TableId>>;

    /// Current provisioned capacity of a table.
    async fn describe_capacity(&self, table: &str) -> RemoteResult<ProvisionedCapacity>;

    /// Set both read and write capacity of a table in one request.
    async fn update_capacity(&self, table: &str, capacity: ProvisionedCapacity)
        -> RemoteResult<()>;
}

/// Historical consumed-capacity statistics. Used for reporting only.
#[async_trait]
pub trait StatisticsService: Send + Sync {
    /// Consumed capacity sums for `operation` on `table`, one datapoint per
    /// `period_secs` between `start` and `end`.
    async fn consumed_capacity(
        &self,
        table: &str,
        operation: Operation,
        start: Timestamp,
        end: Timestamp,
        period_secs: u64,
    ) -> RemoteResult<Vec<ConsumedDatapoint>>;
}
