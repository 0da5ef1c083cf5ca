//! EMA peak trend model.

use capscale_core::Trend;
use capscale_ledger::RateSeries;

/// A pure mapping from a rate series to a trend.
///
/// Implementations must be deterministic and side-effect free: the loop
/// may call them concurrently for different keys and relies on equal input
/// producing equal output.
pub trait TrendModel: Send + Sync {
    fn recommend(&self, series: &RateSeries) -> Trend;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Reference model: rising EMA → add the peak smoothed rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmaPeak {
    pub window: usize,
}

impl EmaPeak {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl Default for EmaPeak {
    fn default() -> Self {
        Self { window: 5 }
    }
}

impl TrendModel for EmaPeak {
    fn recommend(&self, series: &RateSeries) -> Trend {
        analyze(&series.as_f64(), self.window)
    }

    fn name(&self) -> &'static str {
        "ema-peak"
    }
}

/// Exponential moving average seeded with the first sample.
///
/// A window of 0 is treated as 1 (no smoothing).
pub fn ema(series: &[f64], window: usize) -> Vec<f64> {
    let alpha = 2.0 / (window.max(1) as f64 + 1.0);
    let mut out = Vec::with_capacity(series.len());
    for &value in series {
        let next = match out.last() {
            Some(prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        out.push(next);
    }
    out
}

/// Decide whether the smoothed rate is rising and by how much to scale.
pub fn analyze(series: &[f64], window: usize) -> Trend {
    let mut smoothed = ema(series, window);
    smoothed.reverse();

    let (Some(latest), Some(oldest)) = (smoothed.first(), smoothed.last()) else {
        return Trend::FLAT;
    };
    if latest <= oldest {
        return Trend::FLAT;
    }

    let peak = smoothed.iter().copied().fold(f64::MIN, f64::max);
    Trend::up(peak.ceil() as u64)
}
