//! Shared types used across capscale crates.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of a storage table.
pub type TableId = String;

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// The kind of request a table was throttled on.
///
/// All per-table state is kept separately per operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    /// Both operations, in evaluation order.
    pub const ALL: [Operation; 2] = [Operation::Read, Operation::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Read => "read",
            Operation::Write => "write",
        }
    }

    /// Name of the consumed-capacity metric for this operation.
    pub fn consumed_metric(&self) -> &'static str {
        match self {
            Operation::Read => "ConsumedReadCapacityUnits",
            Operation::Write => "ConsumedWriteCapacityUnits",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names neither operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation: {0}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "read" | "readcapacityunits" => Ok(Operation::Read),
            "write" | "writecapacityunits" => Ok(Operation::Write),
            _ => Err(UnknownOperation(s.to_string())),
        }
    }
}

/// Provisioned read/write throughput of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionedCapacity {
    pub read: u64,
    pub write: u64,
}

impl ProvisionedCapacity {
    pub fn new(read: u64, write: u64) -> Self {
        Self { read, write }
    }

    /// Capacity for a single operation.
    pub fn get(&self, operation: Operation) -> u64 {
        match operation {
            Operation::Read => self.read,
            Operation::Write => self.write,
        }
    }

    /// Copy of this capacity with only `operation` changed.
    pub fn with(self, operation: Operation, value: u64) -> Self {
        match operation {
            Operation::Read => Self { read: value, ..self },
            Operation::Write => Self { write: value, ..self },
        }
    }
}

/// A single throttling exception observed on a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEvent {
    pub table: TableId,
    pub operation: Operation,
    pub timestamp: Timestamp,
}

/// Direction of the exception trend over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Flat,
}

/// Output of a trend model: how many capacity units to add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trend {
    pub direction: TrendDirection,
    pub delta: u64,
}

impl Trend {
    /// The "do nothing" trend.
    pub const FLAT: Trend = Trend {
        direction: TrendDirection::Flat,
        delta: 0,
    };

    pub fn up(delta: u64) -> Self {
        Self {
            direction: TrendDirection::Up,
            delta,
        }
    }
}

/// A trend bound to the table and operation it was computed for.
///
/// Produced fresh every tick and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleRecommendation {
    pub table: TableId,
    pub operation: Operation,
    pub delta: u64,
    pub direction: TrendDirection,
}

impl ScaleRecommendation {
    pub fn new(table: &str, operation: Operation, trend: Trend) -> Self {
        Self {
            table: table.to_string(),
            operation,
            delta: trend.delta,
            direction: trend.direction,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.delta > 0
    }
}

/// The full capacity a controller asks the table service to set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityUpdateRequest {
    pub table: TableId,
    pub read: u64,
    pub write: u64,
}

impl CapacityUpdateRequest {
    pub fn new(table: &str, capacity: ProvisionedCapacity) -> Self {
        Self {
            table: table.to_string(),
            read: capacity.read,
            write: capacity.write,
        }
    }

    pub fn capacity(&self) -> ProvisionedCapacity {
        ProvisionedCapacity::new(self.read, self.write)
    }
}

/// One consumed-capacity datapoint from the statistics service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumedDatapoint {
    pub timestamp: Timestamp,
    /// Capacity units consumed over the datapoint's period.
    pub sum: f64,
}

/// Current wall-clock time in epoch milliseconds.
pub fn epoch_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}
