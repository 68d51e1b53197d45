use serde::{Deserialize, Serialize};

/// Running RTT statistics over successful, non-duplicate replies.
///
/// Samples are microseconds. Mean and variance use Welford's online
/// algorithm so no sample history is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RttStats {
    pub count: u32,
    pub mean: f64,
    pub m2: f64,
    pub min: i64,
    pub max: i64,
}

impl RttStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one RTT sample in microseconds
    pub fn update(&mut self, sample_us: i64) {
        self.count += 1;
        let x = sample_us as f64;

        if self.count == 1 {
            self.min = sample_us;
            self.max = sample_us;
            self.mean = x;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(sample_us);
        self.max = self.max.max(sample_us);

        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
    }

    pub fn min(&self) -> Option<i64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<i64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population standard deviation, zero until two samples are in
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        (self.m2 / self.count as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let stats = RttStats::new();
        assert_eq!(stats.count, 0);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.max(), None);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.stddev(), 0.0);
    }

    #[test]
    fn test_single_sample() {
        let mut stats = RttStats::new();
        stats.update(10_000);

        assert_eq!(stats.min(), Some(10_000));
        assert_eq!(stats.max(), Some(10_000));
        assert_eq!(stats.mean(), Some(10_000.0));
        assert_eq!(stats.stddev(), 0.0);
    }

    #[test]
    fn test_welford_known_samples() {
        // 10, 20, 30 ms: mean 20 ms, population stddev ~8.165 ms
        let mut stats = RttStats::new();
        stats.update(10_000);
        stats.update(20_000);
        stats.update(30_000);

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min(), Some(10_000));
        assert_eq!(stats.max(), Some(30_000));
        assert!((stats.mean().unwrap() - 20_000.0).abs() < 1e-9);
        let stddev = stats.stddev();
        assert!(stddev > 8_164.0 && stddev < 8_166.0);
    }

    #[test]
    fn test_zero_rtt_counts() {
        let mut stats = RttStats::new();
        stats.update(0);
        stats.update(0);
        assert_eq!(stats.min(), Some(0));
        assert_eq!(stats.stddev(), 0.0);
    }

    use proptest::prelude::*;

    proptest! {
        /// The online result matches a two-pass computation
        #[test]
        fn proptest_matches_two_pass(samples in prop::collection::vec(0i64..10_000_000, 1..200)) {
            let mut stats = RttStats::new();
            for &s in &samples {
                stats.update(s);
            }

            let n = samples.len() as f64;
            let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n;
            let var = samples.iter().map(|&s| (s as f64 - mean).powi(2)).sum::<f64>() / n;
            let stddev = if samples.len() > 1 { var.sqrt() } else { 0.0 };

            let got_mean = stats.mean().unwrap();
            prop_assert!((got_mean - mean).abs() <= 1e-6 * mean.abs().max(1.0));
            prop_assert!((stats.stddev() - stddev).abs() <= 1e-6 * stddev.max(1.0));
            prop_assert_eq!(stats.min(), samples.iter().copied().min());
            prop_assert_eq!(stats.max(), samples.iter().copied().max());
        }
    }
}
