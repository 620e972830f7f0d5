use clap::Parser;
use std::sync::Arc;

use broker_connect_test::cli::{load_run_params, run_print_config, Cli};
use broker_connect_test::client::sim::SimFactory;
use broker_connect_test::client::ClientFactory;
use broker_connect_test::config::ClientMode;
use broker_connect_test::error::HarnessError;
use broker_connect_test::orchestrator::ConnectionTest;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli {
        Cli::Run {
            config,
            results_dir,
            yes,
        } => run_connection_test(&config, results_dir, yes).await,
        Cli::PrintConfig => run_print_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_connection_test(
    config_path: &std::path::Path,
    results_dir: Option<std::path::PathBuf>,
    yes: bool,
) -> Result<(), HarnessError> {
    let params = load_run_params(config_path, results_dir, yes)?;

    let factory: Arc<dyn ClientFactory> = match &params.client {
        ClientMode::Sim(sim_params) => Arc::new(SimFactory::new(sim_params.clone())),
    };

    let mut test = ConnectionTest::new(params, factory)?;
    test.setup_signal_handler()?;
    println!("Results will be stored in {}", test.results_file_name());
    test.start().await
}
