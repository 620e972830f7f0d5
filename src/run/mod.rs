// Run descriptors and results

use std::fmt;
use std::time::{Duration, Instant};

use crate::config::TestParams;
use crate::stats::ConnectionStats;

/// Immutable snapshot of one run's parameters. Advancing to the next run
/// produces a new descriptor rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDescriptor {
    /// 1-based run index.
    pub idx: u32,
    pub num_endpoints: u32,
    pub concurrency: u32,
    pub rng_seed: u64,
    /// Worst-case time for one endpoint to finish establishment:
    /// connection timeout plus association timeout.
    pub endpoint_timeout: Duration,
    /// `endpoint_timeout * num_endpoints`, the per-task share of the
    /// overall join budget.
    pub total_endpoint_timeout: Duration,
    endpoints_increment: u32,
    concurrency_increment: u32,
}

impl RunDescriptor {
    pub fn first(params: &TestParams) -> Self {
        let endpoint_timeout = Duration::from_millis(params.connection_timeout_ms)
            + Duration::from_secs(params.association_timeout_s);
        Self {
            idx: 1,
            num_endpoints: params.num_endpoints,
            concurrency: params.concurrency,
            rng_seed: params.inter_endpoint_pause_rng_seed,
            endpoint_timeout,
            total_endpoint_timeout: endpoint_timeout * params.num_endpoints,
            endpoints_increment: params.endpoints_increment,
            concurrency_increment: params.concurrency_increment,
        }
    }

    /// The descriptor for the following run: fixed increments applied to
    /// endpoints and concurrency, seed bumped by one.
    pub fn next(&self) -> Self {
        let num_endpoints = self.num_endpoints + self.endpoints_increment;
        Self {
            idx: self.idx + 1,
            num_endpoints,
            concurrency: self.concurrency + self.concurrency_increment,
            rng_seed: self.rng_seed + 1,
            endpoint_timeout: self.endpoint_timeout,
            total_endpoint_timeout: self.endpoint_timeout * num_endpoints,
            endpoints_increment: self.endpoints_increment,
            concurrency_increment: self.concurrency_increment,
        }
    }
}

impl fmt::Display for RunDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: {} concurrent sets of {} endpoints",
            self.idx, self.concurrency, self.num_endpoints
        )
    }
}

/// Result of one run. Created when the run starts (capturing the start
/// instant) and terminal once `set_completion` has been called.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub num_endpoints: u32,
    pub concurrency: u32,
    pub num_failures: u32,
    pub duration: Duration,
    pub stats: Option<ConnectionStats>,
    start: Instant,
}

impl RunResult {
    pub fn new(run: &RunDescriptor) -> Self {
        Self {
            num_endpoints: run.num_endpoints,
            concurrency: run.concurrency,
            num_failures: 0,
            duration: Duration::ZERO,
            stats: None,
            start: Instant::now(),
        }
    }

    pub fn add_failures(&mut self, count: u32) {
        self.num_failures += count;
    }

    /// Stamp the run's duration. Teardown happens after this, so close
    /// handshakes never count toward the reported time.
    pub fn set_completion(&mut self) {
        self.duration = self.start.elapsed();
    }

    /// The flat record appended to the results file.
    pub fn record(&self) -> String {
        let mut line = format!(
            "{},{},{},{}",
            self.num_endpoints,
            self.concurrency,
            self.num_failures,
            self.duration.as_millis()
        );
        if let Some(stats) = &self.stats {
            line.push(',');
            line.push_str(&stats.to_string());
        }
        line
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_connections = self.num_endpoints * self.concurrency;
        if self.num_failures > 0 {
            write!(
                f,
                "  [FAILURE]  {} connection failures out of {} connection attempts",
                self.num_failures, total_connections
            )?;
        } else {
            write!(
                f,
                "  [SUCCESS]  {} successful connections",
                total_connections
            )?;
        }
        write!(
            f,
            " in {}",
            normalize_time_interval(self.duration.as_millis() as u64)
        )?;
        if let Some(stats) = &self.stats {
            write!(f, "\n             connection timings  {}", stats)?;
        }
        Ok(())
    }
}

/// Render a millisecond interval as `X min Y s`, `Y.Z s` or `N ms`.
pub fn normalize_time_interval(duration_ms: u64) -> String {
    let min = duration_ms / 60_000;
    let s = (duration_ms - min * 60_000) / 1000;
    let ms = duration_ms % 1000;

    if min > 0 {
        format!("{} min {} s", min, s)
    } else if s > 0 {
        format!("{}.{} s", s, ms)
    } else {
        format!("{} ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{Phase, TimingAccumulator};
    use proptest::prelude::*;

    fn params() -> TestParams {
        TestParams {
            num_endpoints: 10,
            concurrency: 2,
            endpoints_increment: 5,
            concurrency_increment: 1,
            inter_endpoint_pause_rng_seed: 7,
            connection_timeout_ms: 1500,
            association_timeout_s: 2,
            ..Default::default()
        }
    }

    #[test]
    fn first_descriptor_derives_endpoint_timeout() {
        let run = RunDescriptor::first(&params());
        assert_eq!(run.idx, 1);
        assert_eq!(run.endpoint_timeout, Duration::from_millis(3500));
        assert_eq!(run.total_endpoint_timeout, Duration::from_millis(35_000));
    }

    #[test]
    fn next_applies_increments_and_bumps_seed() {
        let run = RunDescriptor::first(&params());
        let next = run.next();
        assert_eq!(next.idx, 2);
        assert_eq!(next.num_endpoints, 15);
        assert_eq!(next.concurrency, 3);
        assert_eq!(next.rng_seed, 8);
        assert_eq!(next.total_endpoint_timeout, Duration::from_millis(52_500));
        // the original is untouched
        assert_eq!(run.num_endpoints, 10);
    }

    #[test]
    fn descriptor_display_matches_run_banner() {
        let run = RunDescriptor::first(&params());
        assert_eq!(run.to_string(), "run 1: 2 concurrent sets of 10 endpoints");
    }

    proptest! {
        #[test]
        fn prop_advancing_n_times_is_linear(
            initial_endpoints in 1u32..1000,
            initial_concurrency in 1u32..100,
            endpoints_increment in 0u32..50,
            concurrency_increment in 0u32..10,
            seed in 0u64..10_000,
            advances in 0u32..50,
        ) {
            let p = TestParams {
                num_endpoints: initial_endpoints,
                concurrency: initial_concurrency,
                endpoints_increment,
                concurrency_increment,
                inter_endpoint_pause_rng_seed: seed,
                ..Default::default()
            };
            let mut run = RunDescriptor::first(&p);
            for _ in 0..advances {
                run = run.next();
            }
            prop_assert_eq!(run.idx, 1 + advances);
            prop_assert_eq!(
                run.num_endpoints,
                initial_endpoints + advances * endpoints_increment
            );
            prop_assert_eq!(
                run.concurrency,
                initial_concurrency + advances * concurrency_increment
            );
            prop_assert_eq!(run.rng_seed, seed + advances as u64);
            prop_assert_eq!(
                run.total_endpoint_timeout,
                run.endpoint_timeout * run.num_endpoints
            );
        }
    }

    #[test]
    fn result_record_without_stats_has_four_fields() {
        let run = RunDescriptor::first(&params());
        let mut result = RunResult::new(&run);
        result.add_failures(3);
        result.set_completion();
        let record = result.record();
        let fields: Vec<&str> = record.split(',').collect();
        assert_eq!(fields.len(), 4);
        assert_eq!(fields[0], "10");
        assert_eq!(fields[1], "2");
        assert_eq!(fields[2], "3");
    }

    #[test]
    fn result_record_appends_stats_block() {
        let run = RunDescriptor::first(&params());
        let mut result = RunResult::new(&run);
        let acc = TimingAccumulator::new();
        acc.accumulate(Phase::Tcp, Duration::from_micros(250));
        result.stats = Some(acc.snapshot());
        result.set_completion();
        let fields: Vec<String> = result.record().split(',').map(String::from).collect();
        assert_eq!(fields.len(), 16);
        assert_eq!(fields[4], "250");
    }

    #[test]
    fn result_display_reports_success_and_failure() {
        let run = RunDescriptor::first(&params());
        let mut ok = RunResult::new(&run);
        ok.set_completion();
        assert!(ok.to_string().contains("[SUCCESS]"));
        assert!(ok.to_string().contains("20 successful connections"));

        let mut bad = RunResult::new(&run);
        bad.add_failures(4);
        bad.set_completion();
        assert!(bad.to_string().contains("[FAILURE]"));
        assert!(bad
            .to_string()
            .contains("4 connection failures out of 20 connection attempts"));
    }

    #[test]
    fn result_display_carries_the_stats_block_when_present() {
        let run = RunDescriptor::first(&params());
        let mut result = RunResult::new(&run);
        let acc = TimingAccumulator::new();
        acc.accumulate(Phase::Tcp, Duration::from_micros(250));
        result.stats = Some(acc.snapshot());
        result.set_completion();
        let rendered = result.to_string();
        assert!(rendered.contains("connection timings"));
        assert!(rendered.contains(&result.stats.as_ref().unwrap().to_string()));
        // without stats the extra line is absent
        let mut plain = RunResult::new(&run);
        plain.set_completion();
        assert!(!plain.to_string().contains("connection timings"));
    }

    #[test]
    fn normalize_time_interval_picks_the_right_unit() {
        assert_eq!(normalize_time_interval(850), "850 ms");
        assert_eq!(normalize_time_interval(0), "0 ms");
        assert_eq!(normalize_time_interval(1_500), "1.500 s");
        assert_eq!(normalize_time_interval(59_999), "59.999 s");
        assert_eq!(normalize_time_interval(60_000), "1 min 0 s");
        assert_eq!(normalize_time_interval(125_000), "2 min 5 s");
    }
}
