// Test parameter configuration
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::HarnessError;

/// Which protocol-client implementation the harness should instantiate.
///
/// The real broker client lives outside this crate; `Sim` is a
/// deterministic stand-in that exercises the full harness without a
/// broker (dry runs, CI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMode {
    Sim(SimParams),
}

impl Default for ClientMode {
    fn default() -> Self {
        ClientMode::Sim(SimParams::default())
    }
}

/// Behavior of the simulated client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Time a simulated connect takes end to end.
    pub connect_latency_ms: u64,
    /// Every n-th client built fails its connect attempt.
    pub fail_every: Option<u32>,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            connect_latency_ms: 5,
            fail_every: None,
        }
    }
}

/// Connection test parameters, normally loaded from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestParams {
    pub num_runs: u32,
    pub num_endpoints: u32,
    pub concurrency: u32,
    pub endpoints_increment: u32,
    pub concurrency_increment: u32,
    /// Per-endpoint-pair factor of the inter-run pause; the sequencer
    /// sleeps `2000 + inter_run_pause_ms * endpoints * concurrency` ms.
    pub inter_run_pause_ms: u64,
    pub inter_endpoint_pause_ms: u64,
    pub randomize_inter_endpoint_pause: bool,
    pub inter_endpoint_pause_rng_seed: u64,
    pub connection_timeout_ms: u64,
    pub association_timeout_s: u64,
    pub association_request_ttl_s: u64,
    pub connection_check_interval_s: u64,
    pub persist_connections: bool,
    pub show_stats: bool,
    /// Wait for a return key between measurement and teardown.
    pub interactive: bool,
    pub broker_uris: Vec<String>,
    pub certificates_dir: PathBuf,
    pub results_dir: PathBuf,
    /// Client names handed out to endpoints, agents first.
    pub agents: Vec<String>,
    pub controllers: Vec<String>,
    pub client: ClientMode,
}

impl Default for TestParams {
    fn default() -> Self {
        Self {
            num_runs: 1,
            num_endpoints: 1,
            concurrency: 1,
            endpoints_increment: 0,
            concurrency_increment: 0,
            inter_run_pause_ms: 100,
            inter_endpoint_pause_ms: 100,
            randomize_inter_endpoint_pause: false,
            inter_endpoint_pause_rng_seed: 1,
            connection_timeout_ms: 1500,
            association_timeout_s: 15,
            association_request_ttl_s: 120,
            connection_check_interval_s: 15,
            persist_connections: false,
            show_stats: false,
            interactive: true,
            broker_uris: vec!["wss://localhost:8142/server".to_string()],
            certificates_dir: PathBuf::from("test-resources/ssl"),
            results_dir: PathBuf::from("."),
            agents: Vec::new(),
            controllers: Vec::new(),
            client: ClientMode::default(),
        }
    }
}

impl TestParams {
    /// The endpoint count of the last scheduled run.
    pub fn final_num_endpoints(&self) -> u64 {
        self.num_endpoints as u64 + (self.num_runs as u64 - 1) * self.endpoints_increment as u64
    }

    /// The concurrency of the last scheduled run.
    pub fn final_concurrency(&self) -> u64 {
        self.concurrency as u64 + (self.num_runs as u64 - 1) * self.concurrency_increment as u64
    }

    /// Client names needed by the largest run. The name pool must cover
    /// this; exhausting it mid-run is a fatal error.
    pub fn max_clients_needed(&self) -> u64 {
        self.final_num_endpoints() * self.final_concurrency()
    }

    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.num_runs < 1 {
            return Err(HarnessError::Config("num_runs must be at least 1".to_string()));
        }
        if self.num_endpoints < 1 {
            return Err(HarnessError::Config(
                "num_endpoints must be at least 1".to_string(),
            ));
        }
        if self.concurrency < 1 {
            return Err(HarnessError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        // The randomized pacing rate is derived as 1000 / pause, so a zero
        // pause is rejected here rather than in the generator.
        if self.inter_endpoint_pause_ms == 0 {
            return Err(HarnessError::Config(
                "inter_endpoint_pause_ms must be greater than 0".to_string(),
            ));
        }
        if self.broker_uris.is_empty() {
            return Err(HarnessError::Config(
                "at least one broker URI is required".to_string(),
            ));
        }
        let available = (self.agents.len() + self.controllers.len()) as u64;
        let needed = self.max_clients_needed();
        if available < needed {
            return Err(HarnessError::Config(format!(
                "client name pool has {} names but the largest run needs {}",
                available, needed
            )));
        }
        Ok(())
    }
}

pub fn load_from_str(json: &str) -> Result<TestParams, HarnessError> {
    serde_json::from_str(json)
        .map_err(|e| HarnessError::Config(format!("failed to parse test parameters: {}", e)))
}

pub fn load_from_file(path: &Path) -> Result<TestParams, HarnessError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        HarnessError::Config(format!(
            "failed to read test parameters from '{}': {}",
            path.display(),
            e
        ))
    })?;
    load_from_str(&contents)
}
