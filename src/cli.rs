// CLI subcommand definitions using clap derive macros
use clap::Parser;
use std::path::{Path, PathBuf};

use crate::config::TestParams;
use crate::error::HarnessError;

/// Broker connection load test
#[derive(Parser, Debug, PartialEq)]
#[command(name = "broker-connect-test")]
pub enum Cli {
    /// Execute the connection test sequence
    Run {
        /// JSON test parameters file
        config: PathBuf,
        /// Directory for the results file (overrides the configured one)
        #[arg(long)]
        results_dir: Option<PathBuf>,
        /// Run unattended: never wait for a return key between runs
        #[arg(long)]
        yes: bool,
    },
    /// Print the default test parameters as JSON
    PrintConfig,
}

/// Load the parameters file and apply command line overrides.
pub fn load_run_params(
    config: &Path,
    results_dir: Option<PathBuf>,
    yes: bool,
) -> Result<TestParams, HarnessError> {
    let mut params = crate::config::load_from_file(config)?;
    if let Some(dir) = results_dir {
        params.results_dir = dir;
    }
    if yes {
        params.interactive = false;
    }
    Ok(params)
}

pub fn run_print_config() -> Result<(), HarnessError> {
    let defaults = TestParams::default();
    let json = serde_json::to_string_pretty(&defaults)
        .map_err(|e| HarnessError::Config(format!("failed to serialize defaults: {}", e)))?;
    println!("{}", json);
    Ok(())
}
