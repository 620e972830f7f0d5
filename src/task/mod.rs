// Connection task
//
// The unit of work the orchestrator runs in parallel: connect a batch of
// clients one after another, pacing between attempts, and classify every
// outcome. The pacing delay paces task progression, so it is applied
// after failed attempts too.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::client::ClientHandle;
use crate::error::ClientError;
use crate::pacing::PacingSchedule;
use crate::run::normalize_time_interval;
use crate::stats::{Phase, TimingAccumulator};

/// Connect `clients` sequentially, returning the task's failure count
/// (0..=clients.len()). Shares no mutable state with sibling tasks beyond
/// the accumulator.
pub async fn connect_clients_serially(
    clients: Vec<ClientHandle>,
    schedule: PacingSchedule,
    timings: Option<Arc<TimingAccumulator>>,
    task_id: usize,
) -> u32 {
    debug_assert!(
        matches!(schedule, PacingSchedule::Constant { .. }) || schedule.len() == clients.len()
    );

    let start = Instant::now();
    let mut num_failures: u32 = 0;

    for (idx, client) in clients.iter().enumerate() {
        let pause = schedule.delay_at(idx);

        match client.connect().await {
            Ok(()) => {
                let mut associated = client.is_associated();

                if let Some(acc) = &timings {
                    let conn = client.connection_timings();
                    acc.accumulate(Phase::Tcp, conn.tcp);
                    acc.accumulate(Phase::OpeningHandshake, conn.opening_handshake);
                    if associated {
                        acc.accumulate(
                            Phase::Association,
                            client.association_timings().association,
                        );
                    }
                }

                tokio::time::sleep(pause).await;

                // Must still be associated after the pause for success;
                // sessions can drop during the pacing interval.
                associated = associated && client.is_associated();

                if !associated {
                    warn!(
                        "Connection Task {}: client {} is not associated after {} ms",
                        task_id,
                        client.common_name(),
                        pause.as_millis()
                    );
                    num_failures += 1;
                }
            }
            Err(ClientError::Connection(e)) => {
                warn!(
                    "Connection Task {}: client {} failed to connect ({}) - will wait {} ms",
                    task_id,
                    client.common_name(),
                    e,
                    pause.as_millis()
                );
                num_failures += 1;
                tokio::time::sleep(pause).await;
            }
            Err(e) => {
                warn!(
                    "Connection Task {}: unexpected error for client {} ({}) - will wait {} ms",
                    task_id,
                    client.common_name(),
                    e,
                    pause.as_millis()
                );
                num_failures += 1;
                tokio::time::sleep(pause).await;
            }
        }
    }

    // Session durations cover only handles the task did not count as
    // failed: a handle that lost association was already reclassified.
    if let Some(acc) = &timings {
        for client in &clients {
            if client.is_associated() {
                acc.accumulate(
                    Phase::SessionDuration,
                    client.association_timings().session,
                );
            }
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as u64;
    info!(
        "Connection Task {}: completed in {}",
        task_id,
        normalize_time_interval(elapsed_ms)
    );
    num_failures
}
