//! Rate series — bucketed exception counts over one window.

use std::time::Duration;

use capscale_core::Timestamp;

/// Fixed-length sequence of per-bucket exception counts, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RateSeries {
    counts: Vec<u32>,
}

impl RateSeries {
    pub fn new(counts: Vec<u32>) -> Self {
        Self { counts }
    }

    /// Number of buckets a window of `interval` splits into.
    ///
    /// Always at least one; a partial trailing bucket counts as a bucket.
    pub fn bucket_count(interval: Duration, bucket: Duration) -> usize {
        let interval_ms = interval.as_millis().max(1);
        let bucket_ms = bucket.as_millis().max(1);
        interval_ms.div_ceil(bucket_ms).max(1) as usize
    }

    /// Bucket a window snapshot into counts covering `[now - interval, now)`.
    ///
    /// Events older than the window start are ignored. Events stamped at
    /// or after `now` (clock skew between reporters) land in the last
    /// bucket.
    pub fn from_window(
        timestamps: &[Timestamp],
        now: Timestamp,
        interval: Duration,
        bucket: Duration,
    ) -> Self {
        let len = Self::bucket_count(interval, bucket);
        let bucket_ms = (bucket.as_millis() as u64).max(1);
        let start = now.saturating_sub(interval.as_millis() as u64);

        let mut counts = vec![0u32; len];
        for &ts in timestamps {
            if ts < start {
                continue;
            }
            let idx = (((ts - start) / bucket_ms) as usize).min(len - 1);
            counts[idx] = counts[idx].saturating_add(1);
        }
        Self { counts }
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Total number of events in the series.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|c| *c as u64).sum()
    }

    pub fn as_f64(&self) -> Vec<f64> {
        self.counts.iter().map(|c| *c as f64).collect()
    }
}

impl From<Vec<u32>> for RateSeries {
    fn from(counts: Vec<u32>) -> Self {
        Self::new(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);
    const SECOND: Duration = Duration::from_secs(1);

    #[test]
    fn default_window_has_sixty_buckets() {
        assert_eq!(RateSeries::bucket_count(MINUTE, SECOND), 60);
        assert_eq!(
            RateSeries::bucket_count(Duration::from_millis(2_500), SECOND),
            3
        );
    }

    #[test]
    fn empty_window_is_all_zero() {
        let series = RateSeries::from_window(&[], 100_000, MINUTE, SECOND);
        assert_eq!(series.len(), 60);
        assert_eq!(series.total(), 0);
    }

    #[test]
    fn events_land_in_their_bucket() {
        let now = 100_000;
        let start = now - 60_000;
        let stamps = [start, start + 999, start + 1_000, now - 1];
        let series = RateSeries::from_window(&stamps, now, MINUTE, SECOND);
        assert_eq!(series.counts()[0], 2);
        assert_eq!(series.counts()[1], 1);
        assert_eq!(series.counts()[59], 1);
        assert_eq!(series.total(), 4);
    }

    #[test]
    fn old_events_ignored_future_events_clamped() {
        let now = 100_000;
        let stamps = [now - 60_001, now, now + 5_000];
        let series = RateSeries::from_window(&stamps, now, MINUTE, SECOND);
        assert_eq!(series.total(), 2);
        assert_eq!(series.counts()[59], 2);
    }

    #[test]
    fn coarse_buckets() {
        let now = 60_000;
        let stamps = [0, 4_999, 5_000, 59_999];
        let series = RateSeries::from_window(&stamps, now, MINUTE, Duration::from_secs(5));
        assert_eq!(series.len(), 12);
        assert_eq!(series.counts()[0], 2);
        assert_eq!(series.counts()[1], 1);
        assert_eq!(series.counts()[11], 1);
    }
}
