//! capscale-ingest — event ingestion adapter.
//!
//! Upstream throttling notifications arrive as loosely typed records. The
//! adapter validates them, resolves the timestamp and appends one entry to
//! the [`ExceptionLedger`](capscale_ledger::ExceptionLedger). Anything it
//! cannot place is rejected with an [`IngestError`] and never reaches the
//! ledger.

pub mod adapter;

pub use adapter::{IngestError, IngestionAdapter, Notification, THROUGHPUT_EXCEPTION};
