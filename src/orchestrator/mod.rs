// Connection test orchestrator
//
// Drives the whole test sequence: builds each run's batches of clients,
// fans them out as parallel connection tasks, joins them under a shared
// decreasing timeout budget, records one result per run, and hands the
// established connections to either concurrent teardown or the
// keep-alive task.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{
    close_connections_concurrently, Batch, ClientConfig, ClientFactory, NamePool,
};
use crate::config::TestParams;
use crate::error::HarnessError;
use crate::keepalive::KeepAlive;
use crate::pacing::{ExponentialPacing, PacingSchedule};
use crate::run::{normalize_time_interval, RunDescriptor, RunResult};
use crate::stats::TimingAccumulator;
use crate::task::connect_clients_serially;

const CLIENT_TYPE: &str = "agent";
const NAME_SEED: &str = "0000agent";
/// Flat part of the pause between runs, on top of the per-endpoint part.
const BASE_INTER_RUN_PAUSE_MS: u64 = 2000;

pub struct ConnectionTest {
    params: TestParams,
    factory: Arc<dyn ClientFactory>,
    num_runs: u32,
    mean_connection_rate_hz: f64,
    current_run: RunDescriptor,
    results_file_name: String,
    results_path: PathBuf,
    results_file: File,
    keepalive: Option<Arc<KeepAlive>>,
    keepalive_unit: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl ConnectionTest {
    /// Validates the parameters and opens the results sink. Failing to
    /// open it aborts startup entirely; no runs are executed.
    pub fn new(params: TestParams, factory: Arc<dyn ClientFactory>) -> Result<Self, HarnessError> {
        params.validate()?;

        let results_file_name = format!("connection_test_{}.csv", start_timestamp());
        let results_path = params.results_dir.join(&results_file_name);
        let results_file = File::create(&results_path)
            .map_err(|e| HarnessError::ResultsSink(results_file_name.clone(), e))?;

        let mean_connection_rate_hz = 1000.0 / params.inter_endpoint_pause_ms as f64;
        let current_run = RunDescriptor::first(&params);

        Ok(Self {
            num_runs: params.num_runs,
            mean_connection_rate_hz,
            current_run,
            results_file_name,
            results_path,
            results_file,
            params,
            factory,
            keepalive: None,
            keepalive_unit: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    pub fn results_file_name(&self) -> &str {
        &self.results_file_name
    }

    /// Stop after the current run when SIGINT/SIGTERM arrives.
    pub fn setup_signal_handler(&self) -> Result<(), HarnessError> {
        let flag = self.shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .map_err(|e| HarnessError::Config(format!("failed to set signal handler: {}", e)))
    }

    /// Execute the full run sequence. Terminates early only on a fatal
    /// error (or an operator interrupt); per-client failures are absorbed
    /// into the run results.
    pub async fn start(&mut self) -> Result<(), HarnessError> {
        let start_time = Instant::now();
        info!("requested {} runs", self.num_runs);
        self.display_setup();

        let outcome = self.run_sequence().await;

        // connections owned by the keep-alive task survive until the
        // whole sequence is over
        self.stop_keepalive().await;
        self.display_execution_time(start_time);
        outcome
    }

    async fn run_sequence(&mut self) -> Result<(), HarnessError> {
        loop {
            println!("Starting {}", self.current_run);
            let results = self.perform_current_run().await?;

            writeln!(self.results_file, "{}", results.record())?;
            self.results_file.flush()?;
            println!("{}", results);

            self.current_run = self.current_run.next();
            if self.current_run.idx > self.num_runs {
                break;
            }
            if self.shutdown.load(Ordering::SeqCst) {
                warn!(
                    "interrupt received - stopping after run {}",
                    self.current_run.idx - 1
                );
                break;
            }

            // Be nice with the broker and pause before scaling up
            let pause_ms = BASE_INTER_RUN_PAUSE_MS
                + self.params.inter_run_pause_ms
                    * self.current_run.num_endpoints as u64
                    * self.current_run.concurrency as u64;
            tokio::time::sleep(Duration::from_millis(pause_ms)).await;
        }
        Ok(())
    }

    /// Execute exactly one run described by the current descriptor.
    pub async fn perform_current_run(&mut self) -> Result<RunResult, HarnessError> {
        let run = self.current_run.clone();
        let mut results = RunResult::new(&run);

        let timings = if self.params.show_stats {
            Some(Arc::new(TimingAccumulator::new()))
        } else {
            None
        };

        let mut pacing_rng = if self.params.randomize_inter_endpoint_pause {
            Some(ExponentialPacing::new(
                self.mean_connection_rate_hz,
                run.rng_seed,
            )?)
        } else {
            None
        };
        let constant_pause = Duration::from_millis(self.params.inter_endpoint_pause_ms);

        let seed_config = ClientConfig::new(
            NAME_SEED,
            CLIENT_TYPE,
            self.params.broker_uris.clone(),
            self.params.certificates_dir.clone(),
            Duration::from_millis(self.params.connection_timeout_ms),
            Duration::from_secs(self.params.association_timeout_s),
            Duration::from_secs(self.params.association_request_ttl_s),
        );
        let mut names = NamePool::new(&self.params.agents, &self.params.controllers);

        // Spawn concurrent Connection Tasks

        let mut max_total_pause = Duration::ZERO;
        let mut all_batches: Vec<Batch> = Vec::with_capacity(run.concurrency as usize);
        let mut task_units: Vec<JoinHandle<u32>> = Vec::with_capacity(run.concurrency as usize);

        for task_idx in 0..run.concurrency as usize {
            let mut batch = Batch::with_capacity(run.num_endpoints as usize);
            for _ in 0..run.num_endpoints {
                let name = names.next_name().ok_or_else(|| {
                    HarnessError::Fatal(
                        "client name pool exhausted while building batches".to_string(),
                    )
                })?;
                batch.push(self.factory.build(seed_config.with_name(name)));
            }

            // Randomized schedules can differ in total length per task,
            // so track the largest for the join budget.
            let schedule = match pacing_rng.as_mut() {
                Some(rng) => {
                    let schedule = rng.schedule(run.num_endpoints as usize);
                    max_total_pause = max_total_pause.max(schedule.total());
                    schedule
                }
                None => {
                    let schedule = PacingSchedule::Constant {
                        delay: constant_pause,
                        count: run.num_endpoints as usize,
                    };
                    max_total_pause = schedule.total();
                    schedule
                }
            };

            // Keep our own references so that this component, or the
            // Keep Alive task, pays the close-handshake cost after the
            // timed region instead of the connection task.
            all_batches.push(batch.clone());
            task_units.push(tokio::spawn(connect_clients_serially(
                batch,
                schedule,
                timings.clone(),
                task_idx,
            )));
            debug!("run #{} - started Connection Task {}", run.idx, task_idx + 1);
        }

        let budget = max_total_pause + run.total_endpoint_timeout;
        println!(
            "                timeout for establishing all connections {}",
            normalize_time_interval(budget.as_millis() as u64)
        );

        // Join the tasks against the remaining share of one common
        // budget. A task that misses its share is abandoned, not
        // force-stopped, and accounted as a full failure.

        let join_start = Instant::now();
        for (task_idx, unit) in task_units.into_iter().enumerate() {
            let remaining = budget.saturating_sub(join_start.elapsed());
            match tokio::time::timeout(remaining, unit).await {
                Err(_) => {
                    warn!("run #{} - Connection Task {} timed out", run.idx, task_idx);
                    results.add_failures(run.num_endpoints);
                }
                Ok(Err(e)) => {
                    warn!(
                        "run #{} - Connection Task {} failure: {}",
                        run.idx, task_idx, e
                    );
                    results.add_failures(run.num_endpoints);
                }
                Ok(Ok(task_failures)) => results.add_failures(task_failures),
            }
        }

        println!("                done - closing connections and retrieving results");
        results.set_completion();

        if let Some(accumulator) = &timings {
            results.stats = Some(accumulator.snapshot());
        }

        info!(
            "run #{} - got Connection Task results; about to close connections",
            run.idx
        );

        self.wait_for_ack().await?;

        if self.params.persist_connections {
            self.hand_off_to_keepalive(all_batches).await;
        } else {
            close_connections_concurrently(all_batches).await;
        }

        Ok(results)
    }

    /// The gate between measurement and teardown: wait for an explicit
    /// acknowledgment unless running unattended.
    async fn wait_for_ack(&self) -> Result<(), HarnessError> {
        if !self.params.interactive {
            return Ok(());
        }
        print!("Press return to continue...");
        std::io::stdout().flush()?;
        tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| ())
        })
        .await
        .map_err(|e| HarnessError::Fatal(format!("failed to wait for acknowledgment: {}", e)))??;
        Ok(())
    }

    async fn hand_off_to_keepalive(&mut self, batches: Vec<Batch>) {
        if self.keepalive.is_none() {
            let keepalive = KeepAlive::new(Duration::from_secs(
                self.params.connection_check_interval_s,
            ));
            self.keepalive_unit = Some(keepalive.spawn());
            info!("run #{} - started Keep Alive Task", self.current_run.idx);
            self.keepalive = Some(keepalive);
        }
        if let Some(keepalive) = &self.keepalive {
            keepalive.adopt(batches).await;
        }
    }

    async fn stop_keepalive(&mut self) {
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.request_stop();
            if let Some(unit) = self.keepalive_unit.take() {
                if let Err(e) = unit.await {
                    error!("Keep Alive Task failed: {}", e);
                }
            }
        }
    }

    fn display_setup(&self) {
        let p = &self.params;
        println!("\nConnection test setup:");
        println!(
            "  {} concurrent sets (+{} per run) of {} endpoints (+{} per run)",
            p.concurrency, p.concurrency_increment, p.num_endpoints, p.endpoints_increment
        );
        println!(
            "  {} runs, ({} + {} * num_endpoints * concurrency) ms pause between each run",
            p.num_runs, BASE_INTER_RUN_PAUSE_MS, p.inter_run_pause_ms
        );
        print!("  {} ms pause between each set connection", p.inter_endpoint_pause_ms);
        if p.randomize_inter_endpoint_pause {
            print!(" (mean value - exp. distribution)");
        }
        println!();
        println!("  connection timeout {} ms", p.connection_timeout_ms);
        println!(
            "  association timeout {} s; association request TTL {} s",
            p.association_timeout_s, p.association_request_ttl_s
        );
        if p.persist_connections {
            println!(
                "  keep connections alive: yes, by pinging every {} s\n",
                p.connection_check_interval_s
            );
        } else {
            println!("  keep connections alive: no\n");
        }
    }

    fn display_execution_time(&self, start_time: Instant) {
        let total = start_time.elapsed();
        let minutes = total.as_secs() / 60;
        let seconds = total.as_secs() % 60;
        print!(
            "\nConnection test: finished in {} m {} s",
            minutes, seconds
        );

        if self.current_run.idx <= self.num_runs {
            println!("{}\n", early_termination_note(self.current_run.idx - 1));
        } else {
            println!("\n");
        }
    }
}

fn early_termination_note(executed_runs: u32) -> String {
    match executed_runs {
        0 => "; no runs were completed".to_string(),
        1 => "; only the first run was executed".to_string(),
        n => format!("; only the first {} runs were executed", n),
    }
}

/// Unix-seconds timestamp used in the results file name.
fn start_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
