//! capscale-controller — applies scale recommendations to tables.
//!
//! For a non-zero delta the controller reads the table's current
//! provisioned capacity, adds the delta to the throttled operation, and
//! sends one update carrying both operations (the untouched one
//! unchanged). At most one update per table is ever in flight; a
//! recommendation arriving while one is outstanding is dropped, not
//! queued. Every remote call is bounded by a timeout so the in-flight slot
//! is always released.
//!
//! Capacity is never decreased.

pub mod controller;
pub mod error;

pub use controller::{CapacityController, InFlightGuard, ScaleOutcome};
pub use error::ControllerError;
