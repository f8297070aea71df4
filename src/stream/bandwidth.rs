//! C3 (bandwidth half): EWMA bandwidth estimation from completed segment
//! requests (§4.3).
//!
//! Grounded on the throughput-sample bookkeeping in
//! `crates/mesio/src/hls/metrics.rs` (byte/duration samples folded into a
//! moving average), generalized to the spec's fast/slow dual-window EWMA.

use std::time::Duration;

/// One completed (or aborted-but-measurable) segment download.
#[derive(Debug, Clone, Copy)]
pub struct ThroughputSample {
    pub bytes: u64,
    pub duration: Duration,
}

/// Dual-window EWMA bandwidth estimator (§4.3): a fast-reacting window and a
/// slow, more stable one; the exposed estimate biases toward whichever is
/// lower so a transient slow segment is reflected immediately but a single
/// lucky fast segment doesn't overshoot the estimate.
#[derive(Debug, Clone)]
pub struct BandwidthEstimator {
    fast_half_life: Duration,
    slow_half_life: Duration,
    min_sample_duration: Duration,
    fast_estimate: Option<f64>,
    slow_estimate: Option<f64>,
    sample_count: u32,
}

impl BandwidthEstimator {
    pub fn new(fast_half_life: Duration, slow_half_life: Duration, min_sample_duration: Duration) -> Self {
        Self {
            fast_half_life,
            slow_half_life,
            min_sample_duration,
            fast_estimate: None,
            slow_estimate: None,
            sample_count: 0,
        }
    }

    /// Seed the estimator with a configured initial bitrate (bits/sec),
    /// used before any real sample has landed (§6 `initialBitrate`).
    pub fn seed(&mut self, initial_bits_per_second: u64) {
        if self.sample_count == 0 {
            self.fast_estimate = Some(initial_bits_per_second as f64);
            self.slow_estimate = Some(initial_bits_per_second as f64);
        }
    }

    /// Fold in one completed download. Samples shorter than
    /// `min_sample_duration` are dropped: too noisy to be informative (§4.3
    /// edge case "very short segment durations").
    pub fn add_sample(&mut self, sample: ThroughputSample) {
        if sample.duration < self.min_sample_duration || sample.duration.is_zero() {
            return;
        }
        let bits_per_second = (sample.bytes as f64 * 8.0) / sample.duration.as_secs_f64();

        self.fast_estimate = Some(ewma(self.fast_estimate, bits_per_second, self.fast_half_life, sample.duration));
        self.slow_estimate = Some(ewma(self.slow_estimate, bits_per_second, self.slow_half_life, sample.duration));
        self.sample_count += 1;
    }

    /// Current bandwidth estimate in bits/sec, biased toward the lower of
    /// the two windows (§4.3: "the smaller of the two estimates").
    pub fn estimate(&self) -> Option<f64> {
        match (self.fast_estimate, self.slow_estimate) {
            (Some(f), Some(s)) => Some(f.min(s)),
            (Some(f), None) => Some(f),
            (None, Some(s)) => Some(s),
            (None, None) => None,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

/// Time-weighted EWMA: `alpha` shrinks toward 0 as `elapsed` grows relative
/// to `half_life`, so a sample spanning a long download counts for more than
/// one spanning a short one.
fn ewma(previous: Option<f64>, sample: f64, half_life: Duration, elapsed: Duration) -> f64 {
    match previous {
        None => sample,
        Some(prev) => {
            let half_life_s = half_life.as_secs_f64().max(f64::EPSILON);
            let weight = 2f64.powf(-(elapsed.as_secs_f64() / half_life_s));
            weight * prev + (1.0 - weight) * sample
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_sets_estimate_directly() {
        let mut est = BandwidthEstimator::new(Duration::from_secs(4), Duration::from_secs(15), Duration::from_millis(50));
        est.add_sample(ThroughputSample {
            bytes: 1_000_000,
            duration: Duration::from_secs(1),
        });
        let bps = est.estimate().unwrap();
        assert!((bps - 8_000_000.0).abs() < 1.0);
    }

    #[test]
    fn degrading_throughput_pulls_fast_window_down_faster_than_slow() {
        let mut est = BandwidthEstimator::new(Duration::from_secs(2), Duration::from_secs(20), Duration::from_millis(50));
        for _ in 0..3 {
            est.add_sample(ThroughputSample {
                bytes: 10_000_000,
                duration: Duration::from_secs(1),
            });
        }
        let before = est.estimate().unwrap();
        for _ in 0..5 {
            est.add_sample(ThroughputSample {
                bytes: 500_000,
                duration: Duration::from_secs(1),
            });
        }
        let after = est.estimate().unwrap();
        assert!(after < before);
    }

    #[test]
    fn estimate_biases_toward_lower_window() {
        let mut est = BandwidthEstimator::new(Duration::from_millis(500), Duration::from_secs(30), Duration::from_millis(50));
        for _ in 0..2 {
            est.add_sample(ThroughputSample {
                bytes: 10_000_000,
                duration: Duration::from_secs(1),
            });
        }
        est.add_sample(ThroughputSample {
            bytes: 100_000,
            duration: Duration::from_secs(1),
        });
        let estimate = est.estimate().unwrap();
        assert!(estimate < 10_000_000.0 * 8.0);
    }

    #[test]
    fn too_short_samples_are_dropped() {
        let mut est = BandwidthEstimator::new(Duration::from_secs(4), Duration::from_secs(15), Duration::from_millis(200));
        est.add_sample(ThroughputSample {
            bytes: 1_000_000,
            duration: Duration::from_millis(10),
        });
        assert_eq!(est.sample_count(), 0);
        assert!(est.estimate().is_none());
    }

    #[test]
    fn seed_only_applies_before_first_sample() {
        let mut est = BandwidthEstimator::new(Duration::from_secs(4), Duration::from_secs(15), Duration::from_millis(50));
        est.seed(2_000_000);
        assert_eq!(est.estimate(), Some(2_000_000.0));
        est.add_sample(ThroughputSample {
            bytes: 1_000_000,
            duration: Duration::from_secs(1),
        });
        est.seed(9_999_999);
        assert_ne!(est.estimate(), Some(9_999_999.0));
    }
}
