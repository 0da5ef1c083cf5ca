//! capscale-analyzer — turns a rate series into a scale recommendation.
//!
//! # Algorithm
//!
//! ```text
//! alpha  = 2 / (window + 1)
//! ema[0] = series[0]
//! ema[i] = alpha * series[i] + (1 - alpha) * ema[i - 1]
//!
//! if ema[last] > ema[0]:
//!     Up, delta = ceil(max(ema))
//! else:
//!     Flat, delta = 0
//! ```
//!
//! The peak of the smoothed rate sizes the capacity bump to absorb the
//! worst throttling rate seen in the window, while the EMA damps single
//! bucket noise. Models implement [`TrendModel`] so the loop can be handed
//! a different one without touching the loop or controller.

pub mod trend;

pub use trend::{EmaPeak, TrendModel, analyze, ema};
