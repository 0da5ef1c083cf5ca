//! capscale-core — shared vocabulary for the capscale workspace.
//!
//! Holds the table/operation/capacity types every other crate speaks,
//! the `capscale.toml` configuration parser, the async contracts for the
//! remote table-management and statistics services, and an in-memory
//! backend implementing those contracts.

pub mod config;
pub mod error;
pub mod memory;
pub mod remote;
pub mod types;

pub use config::CapscaleConfig;
pub use error::{ConfigError, RemoteError, RemoteResult};
pub use memory::InMemoryBackend;
pub use remote::{StatisticsService, TableService};
pub use types::*;
