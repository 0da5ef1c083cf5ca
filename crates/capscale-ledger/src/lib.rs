//! capscale-ledger — rolling windows of throttling exceptions.
//!
//! Keeps an append-only, per-(table, operation) list of exception
//! timestamps that the scaling loop snapshots, buckets, and trims once per
//! tick.
//!
//! # Architecture
//!
//! ```text
//! ExceptionLedger
//!   ├── append()      ← called per ingested notification
//!   ├── snapshot()    → copy of one window, arrival order
//!   ├── trim()        → drop entries older than a cutoff
//!   └── sync_tables() ← table list refresh at the start of a tick
//!
//! RateSeries::from_window() → fixed-length per-bucket counts
//! ```

pub mod ledger;
pub mod series;

pub use ledger::{ExceptionLedger, WindowSizes};
pub use series::RateSeries;
