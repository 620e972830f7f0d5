// Inter-endpoint pacing
//
// A connection task waits between successive connection attempts, either
// for a fixed configured pause or for delays drawn from an exponential
// distribution whose mean matches the configured pause. Draws are
// deterministic for a given seed so runs can be reproduced.

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Exp};

use crate::error::HarnessError;

/// The pacing delays for one connection task: a single constant delay
/// applied to every endpoint, or one pre-drawn delay per endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacingSchedule {
    Constant { delay: Duration, count: usize },
    PerEndpoint(Vec<Duration>),
}

impl PacingSchedule {
    pub fn len(&self) -> usize {
        match self {
            PacingSchedule::Constant { count, .. } => *count,
            PacingSchedule::PerEndpoint(delays) => delays.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The delay to apply after the `idx`-th connection attempt.
    pub fn delay_at(&self, idx: usize) -> Duration {
        match self {
            PacingSchedule::Constant { delay, .. } => *delay,
            PacingSchedule::PerEndpoint(delays) => delays.get(idx).copied().unwrap_or(Duration::ZERO),
        }
    }

    /// Total pause accumulated over the whole task.
    pub fn total(&self) -> Duration {
        match self {
            PacingSchedule::Constant { delay, count } => *delay * *count as u32,
            PacingSchedule::PerEndpoint(delays) => delays.iter().sum(),
        }
    }
}

/// Seeded generator of exponentially distributed integer delays.
///
/// Two generators built with the same rate and seed produce identical
/// sequences.
pub struct ExponentialPacing {
    rng: SmallRng,
    dist: Exp<f64>,
}

impl ExponentialPacing {
    /// `mean_rate_hz` is the target connection rate, derived from the
    /// configured pause as `1000 / pause_ms`.
    pub fn new(mean_rate_hz: f64, seed: u64) -> Result<Self, HarnessError> {
        if !(mean_rate_hz > 0.0) {
            return Err(HarnessError::Config(format!(
                "mean connection rate must be positive, got {}",
                mean_rate_hz
            )));
        }
        let dist = Exp::new(mean_rate_hz)
            .map_err(|e| HarnessError::Config(format!("invalid pacing rate: {}", e)))?;
        Ok(Self {
            rng: SmallRng::seed_from_u64(seed),
            dist,
        })
    }

    /// Draw one delay, rounded to whole milliseconds.
    pub fn draw_ms(&mut self) -> u64 {
        (self.dist.sample(&mut self.rng) * 1000.0).round() as u64
    }

    /// Draw one delay per endpoint.
    pub fn schedule(&mut self, num_endpoints: usize) -> PacingSchedule {
        let delays = (0..num_endpoints)
            .map(|_| Duration::from_millis(self.draw_ms()))
            .collect();
        PacingSchedule::PerEndpoint(delays)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn constant_schedule_returns_configured_delay_everywhere() {
        let schedule = PacingSchedule::Constant {
            delay: Duration::from_millis(25),
            count: 4,
        };
        for idx in 0..4 {
            assert_eq!(schedule.delay_at(idx), Duration::from_millis(25));
        }
        assert_eq!(schedule.total(), Duration::from_millis(100));
        assert_eq!(schedule.len(), 4);
    }

    #[test]
    fn per_endpoint_schedule_totals_its_delays() {
        let schedule = PacingSchedule::PerEndpoint(vec![
            Duration::from_millis(10),
            Duration::from_millis(0),
            Duration::from_millis(7),
        ]);
        assert_eq!(schedule.len(), 3);
        assert_eq!(schedule.delay_at(0), Duration::from_millis(10));
        assert_eq!(schedule.delay_at(2), Duration::from_millis(7));
        assert_eq!(schedule.total(), Duration::from_millis(17));
    }

    #[test]
    fn out_of_range_index_yields_zero_delay() {
        let schedule = PacingSchedule::PerEndpoint(vec![Duration::from_millis(10)]);
        assert_eq!(schedule.delay_at(5), Duration::ZERO);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(ExponentialPacing::new(0.0, 1).is_err());
        assert!(ExponentialPacing::new(-4.0, 1).is_err());
        assert!(ExponentialPacing::new(f64::NAN, 1).is_err());
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = ExponentialPacing::new(10.0, 42).unwrap();
        let mut b = ExponentialPacing::new(10.0, 42).unwrap();
        let draws_a: Vec<u64> = (0..64).map(|_| a.draw_ms()).collect();
        let draws_b: Vec<u64> = (0..64).map(|_| b.draw_ms()).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = ExponentialPacing::new(10.0, 1).unwrap();
        let mut b = ExponentialPacing::new(10.0, 2).unwrap();
        let draws_a: Vec<u64> = (0..64).map(|_| a.draw_ms()).collect();
        let draws_b: Vec<u64> = (0..64).map(|_| b.draw_ms()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn schedule_matches_raw_draws() {
        let mut gen = ExponentialPacing::new(20.0, 7).unwrap();
        let schedule = gen.schedule(10);
        let mut replay = ExponentialPacing::new(20.0, 7).unwrap();
        match schedule {
            PacingSchedule::PerEndpoint(delays) => {
                assert_eq!(delays.len(), 10);
                for d in delays {
                    assert_eq!(d, Duration::from_millis(replay.draw_ms()));
                }
            }
            other => panic!("expected per-endpoint schedule, got {:?}", other),
        }
    }

    #[test]
    fn sample_mean_tracks_configured_rate() {
        // 100 Hz -> mean pause 10 ms; the mean of many draws should land
        // in the same ballpark.
        let mut gen = ExponentialPacing::new(100.0, 3).unwrap();
        let n = 20_000u64;
        let total: u64 = (0..n).map(|_| gen.draw_ms()).sum();
        let mean = total as f64 / n as f64;
        assert!((5.0..15.0).contains(&mean), "mean {} ms out of range", mean);
    }

    proptest! {
        #[test]
        fn prop_determinism_for_any_seed_and_rate(
            seed in any::<u64>(),
            rate in 0.1f64..1000.0,
            draws in 1usize..128,
        ) {
            let mut a = ExponentialPacing::new(rate, seed).unwrap();
            let mut b = ExponentialPacing::new(rate, seed).unwrap();
            let sa: Vec<u64> = (0..draws).map(|_| a.draw_ms()).collect();
            let sb: Vec<u64> = (0..draws).map(|_| b.draw_ms()).collect();
            prop_assert_eq!(sa, sb);
        }

        #[test]
        fn prop_constant_total_is_delay_times_count(
            delay_ms in 0u64..10_000,
            count in 0usize..1000,
        ) {
            let schedule = PacingSchedule::Constant {
                delay: Duration::from_millis(delay_ms),
                count,
            };
            prop_assert_eq!(
                schedule.total(),
                Duration::from_millis(delay_ms) * count as u32
            );
        }
    }
}
