use super::OpDuration;

/// Running sum and count of completed durations.
///
/// The sum is a compensated (Neumaier) float so long streams of small
/// values do not lose precision against a large total. The average is
/// always derived, never stored.
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    sum_us: f64,
    compensation: f64,
    count: u64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, duration: OpDuration) {
        let value = duration.as_micros() as f64;
        let total = self.sum_us + value;
        if self.sum_us.abs() >= value.abs() {
            self.compensation += (self.sum_us - total) + value;
        } else {
            self.compensation += (value - total) + self.sum_us;
        }
        self.sum_us = total;
        self.count += 1;
    }

    /// Mean in microseconds, `0.0` before the first duration.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum() / self.count as f64
    }

    pub fn sum(&self) -> f64 {
        self.sum_us + self.compensation
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_average_is_zero() {
        assert_eq!(Accumulator::new().average(), 0.0);
    }

    #[test]
    fn reference_average() {
        let mut acc = Accumulator::new();
        acc.add(OpDuration::from_millis(2000));
        acc.add(OpDuration::from_millis(400));
        assert_eq!(acc.count(), 2);
        assert_eq!(acc.average(), 1_200_000.0);
    }

    #[test]
    fn small_values_survive_a_huge_total() {
        let mut acc = Accumulator::new();
        acc.add(OpDuration::from_micros(1 << 53));
        for _ in 0..1_000 {
            acc.add(OpDuration::from_micros(1));
        }
        assert_eq!(acc.sum(), ((1u64 << 53) + 1_000) as f64);
    }

    proptest! {
        #[test]
        fn average_matches_exact_mean(values in prop::collection::vec(0u64..10_000_000_000, 1..500)) {
            let mut acc = Accumulator::new();
            for v in &values {
                acc.add(OpDuration::from_micros(*v));
            }
            let exact = values.iter().map(|v| *v as u128).sum::<u128>() as f64 / values.len() as f64;
            let avg = acc.average();
            let tolerance = exact.abs().max(1.0) * 1e-9;
            prop_assert!((avg - exact).abs() <= tolerance, "avg {} vs exact {}", avg, exact);
        }
    }
}
