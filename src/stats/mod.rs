// Connection timing statistics
//
// Connection tasks running in parallel feed per-phase latency samples into
// a shared accumulator; the orchestrator snapshots it once every task has
// been joined. Updates are lock-free atomics so writers never contend on
// a mutex.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The four measured phases of a connection's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Tcp,
    OpeningHandshake,
    Association,
    SessionDuration,
}

const NUM_PHASES: usize = 4;

#[derive(Debug)]
struct PhaseAccumulator {
    count: AtomicU64,
    total_us: AtomicU64,
    min_us: AtomicU64,
    max_us: AtomicU64,
}

impl PhaseAccumulator {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_us: AtomicU64::new(0),
            min_us: AtomicU64::new(u64::MAX),
            max_us: AtomicU64::new(0),
        }
    }

    fn record(&self, value_us: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_us.fetch_add(value_us, Ordering::Relaxed);
        self.min_us.fetch_min(value_us, Ordering::Relaxed);
        self.max_us.fetch_max(value_us, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PhaseStats {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return PhaseStats::default();
        }
        let total = self.total_us.load(Ordering::Relaxed);
        PhaseStats {
            count,
            min: Duration::from_micros(self.min_us.load(Ordering::Relaxed)),
            mean: Duration::from_micros(total / count),
            max: Duration::from_micros(self.max_us.load(Ordering::Relaxed)),
        }
    }
}

/// Thread-safe accumulator of per-phase latency samples.
#[derive(Debug)]
pub struct TimingAccumulator {
    phases: [PhaseAccumulator; NUM_PHASES],
}

impl Default for TimingAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingAccumulator {
    pub fn new() -> Self {
        Self {
            phases: [
                PhaseAccumulator::new(),
                PhaseAccumulator::new(),
                PhaseAccumulator::new(),
                PhaseAccumulator::new(),
            ],
        }
    }

    /// Record one sample. Callable concurrently from any number of tasks.
    pub fn accumulate(&self, phase: Phase, value: Duration) {
        self.phases[phase as usize].record(value.as_micros() as u64);
    }

    /// Produce per-phase summaries. Meant to be called once all writers
    /// have been joined; phases with no samples yield zeroed summaries.
    pub fn snapshot(&self) -> ConnectionStats {
        ConnectionStats {
            tcp: self.phases[Phase::Tcp as usize].snapshot(),
            opening_handshake: self.phases[Phase::OpeningHandshake as usize].snapshot(),
            association: self.phases[Phase::Association as usize].snapshot(),
            session: self.phases[Phase::SessionDuration as usize].snapshot(),
        }
    }
}

/// Summary of one phase: sample count plus min/mean/max latency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub count: u64,
    pub min: Duration,
    pub mean: Duration,
    pub max: Duration,
}

/// Snapshot of all four phases, rendered as the comma-separated block
/// appended to a run's result record. TCP and opening-handshake figures
/// are in microseconds, association and session figures in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub tcp: PhaseStats,
    pub opening_handshake: PhaseStats,
    pub association: PhaseStats,
    pub session: PhaseStats,
}

impl fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            self.tcp.min.as_micros(),
            self.tcp.mean.as_micros(),
            self.tcp.max.as_micros(),
            self.opening_handshake.min.as_micros(),
            self.opening_handshake.mean.as_micros(),
            self.opening_handshake.max.as_micros(),
            self.association.min.as_millis(),
            self.association.mean.as_millis(),
            self.association.max.as_millis(),
            self.session.min.as_millis(),
            self.session.mean.as_millis(),
            self.session.max.as_millis(),
        )
    }
}
