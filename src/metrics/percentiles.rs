use hdrhistogram::Histogram;
use serde::Serialize;

use super::OpDuration;

/// Histogram range: 1 μs → 1 day, 3 significant figures.
/// Longer durations saturate at the top bucket.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 86_400_000_000;
const HIST_SIGFIG: u8 = 3;

/// Distribution of every completed duration. Lives next to the exact
/// accumulator; it never feeds the reported average.
#[derive(Debug, Clone)]
pub struct DurationHistogram {
    hist: Histogram<u64>,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self {
            hist: Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram creation"),
        }
    }

    /// Zero-length durations are clamped to the 1 μs floor.
    pub fn record(&mut self, duration: OpDuration) {
        self.hist.saturating_record(duration.as_micros().max(HIST_LOW));
    }

    pub fn percentiles(&self) -> PercentileSet {
        PercentileSet::from_histogram(&self.hist)
    }
}

impl Default for DurationHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile breakdown of completed durations, all in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileSet {
    pub min_us: u64,
    pub max_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub count: u64,
}

impl PercentileSet {
    /// Zeroed when the histogram is empty.
    pub fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::empty();
        }

        Self {
            min_us: hist.min(),
            max_us: hist.max(),
            p50_us: hist.value_at_quantile(0.50),
            p95_us: hist.value_at_quantile(0.95),
            p99_us: hist.value_at_quantile(0.99),
            p999_us: hist.value_at_quantile(0.999),
            count: hist.len(),
        }
    }

    pub fn empty() -> Self {
        Self {
            min_us: 0,
            max_us: 0,
            p50_us: 0,
            p95_us: 0,
            p99_us: 0,
            p999_us: 0,
            count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_reports_zeroes() {
        let set = DurationHistogram::new().percentiles();
        assert_eq!(set, PercentileSet::empty());
        assert_eq!(set.count, 0);
    }

    #[test]
    fn records_and_ranks() {
        let mut hist = DurationHistogram::new();
        for ms in 1..=100 {
            hist.record(OpDuration::from_millis(ms));
        }
        let set = hist.percentiles();
        assert_eq!(set.count, 100);
        assert!(hist.hist.equivalent(set.min_us, 1_000));
        assert!(hist.hist.equivalent(set.p50_us, 50_000));
        assert!(hist.hist.equivalent(set.max_us, 100_000));
    }

    #[test]
    fn zero_and_huge_values_are_kept() {
        let mut hist = DurationHistogram::new();
        hist.record(OpDuration::from_micros(0));
        hist.record(OpDuration::from_micros(u64::MAX));
        assert_eq!(hist.percentiles().count, 2);
    }
}
