//! capscale-autoscale — the periodic scaling loop.
//!
//! Every `interval` the loop re-lists the watched tables, snapshots and
//! trims each (table, operation) exception window, hands the bucketed rate
//! series to the trend model, and dispatches non-zero recommendations to
//! the capacity controller on their own tasks. A slow or failing update on
//! one table never holds up analysis of the others or the next tick.
//!
//! # Tick
//!
//! ```text
//! Idle ──timer──▶ Ticking
//!   list_tables()            (failure: keep last known set)
//!   ledger.sync_tables()
//!   for table × {read, write}:
//!       snapshot_and_trim(cutoff)
//!       RateSeries::from_window()
//!       model.recommend()
//!       delta > 0 → collect per table
//!   per table with raises → spawn controller.apply_claimed_many()
//! Ticking ──▶ Idle
//! ```
//!
//! The loop only exists once [`ScalingLoop::connect`] has listed the
//! tables successfully; a failure there is fatal to the caller.

pub mod scaler;

pub use scaler::{BootstrapError, KeyAnalysis, LoopSettings, LoopState, ScalingLoop, TickReport};
