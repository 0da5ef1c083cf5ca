//! capscale-report — read-only throughput report.
//!
//! For each table the reporter reads the provisioned capacity and the
//! consumed capacity statistics over a lookback window, and expresses every
//! datapoint as a fraction of what is provisioned:
//!
//! ```text
//! value = (sum / period_secs) / provisioned[operation]
//! ```
//!
//! A value near 1.0 means the table is using all of its capacity for that
//! period. The reporter never touches the ledger or the controller.

pub mod reporter;

pub use reporter::{NormalizedPoint, TableThroughput, ThroughputReport, ThroughputReporter};
