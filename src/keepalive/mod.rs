// Keep-alive task
//
// A single background loop that owns the batches of every run executed
// with connection persistence enabled. It periodically pings all
// still-associated handles, and on cancellation tears everything it owns
// down concurrently. Started at most once per test sequence; later runs
// add their batches to it instead of starting another loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::client::{close_connections_concurrently, Batch, ClientHandle};

/// Pause between consecutive pings so a sweep does not burst the broker.
pub const PING_PAUSE: Duration = Duration::from_millis(2);

pub struct KeepAlive {
    check_interval: Duration,
    stop: AtomicBool,
    wake: Notify,
    batches: Mutex<Vec<Batch>>,
}

impl KeepAlive {
    pub fn new(check_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            check_interval,
            stop: AtomicBool::new(false),
            wake: Notify::new(),
            batches: Mutex::new(Vec::new()),
        })
    }

    /// Launch the background loop.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let task = Arc::clone(self);
        tokio::spawn(task.run())
    }

    /// Transfer ownership of a run's batches into the loop.
    pub async fn adopt(&self, new_batches: Vec<Batch>) {
        let mut batches = self.batches.lock().await;
        batches.extend(new_batches);
    }

    /// Cancel the loop; it wakes immediately, tears down every handle it
    /// owns and exits.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so a stop that lands while the loop
        // is between notified() registrations still wakes the next wait
        self.wake.notify_one();
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub async fn owned_handles(&self) -> usize {
        self.batches.lock().await.iter().map(Vec::len).sum()
    }

    async fn run(self: Arc<Self>) {
        info!(
            "starting Keep Alive Task, check interval {} s",
            self.check_interval.as_secs()
        );

        while !self.stop_requested() {
            let interval = self.effective_interval().await;
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.wake.notified() => {}
            }
            if self.stop_requested() {
                break;
            }
            self.ping_sweep().await;
        }

        let batches: Vec<Batch> = {
            let mut owned = self.batches.lock().await;
            owned.drain(..).collect()
        };
        close_connections_concurrently(batches).await;
        info!("Keep Alive Task completed");
    }

    /// Sleep until the next check point: the configured interval minus
    /// the estimated sweep time, floored at one second so long sweeps do
    /// not starve the idle interval entirely.
    async fn effective_interval(&self) -> Duration {
        let estimated_sweep = PING_PAUSE * self.owned_handles().await as u32;
        std::cmp::max(
            self.check_interval.saturating_sub(estimated_sweep),
            Duration::from_secs(1),
        )
    }

    async fn ping_sweep(&self) {
        // Snapshot the handles so a run handing off new batches is not
        // blocked for the whole sweep.
        let snapshot: Vec<ClientHandle> = {
            let batches = self.batches.lock().await;
            batches.iter().flatten().cloned().collect()
        };

        for client in snapshot {
            if self.stop_requested() {
                break;
            }
            if client.is_associated() {
                if let Err(e) = client.ping().await {
                    // failed pings are logged but the handle stays owned
                    error!("client {} failed to ping ({})", client.common_name(), e);
                }
                tokio::time::sleep(PING_PAUSE).await;
            }
        }
    }
}
