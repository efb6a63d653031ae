#![forbid(unsafe_code)]

//! Scenario runner binary entry point.

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use watchkit::ObservationConfig;
use watchkit_demo::cli;

const DEFAULT_FILTER: &str = "info,watchkit=debug";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

fn main() {
    let opts = cli::Opts::parse();
    init_tracing();

    let config = match ObservationConfig::from_env() {
        Ok(config) => {
            info!(?config, "observation config");
            config
        }
        Err(e) => {
            warn!(error = %e, "ignoring observation config from environment");
            ObservationConfig::default()
        }
    };

    let reports = opts.scenario.run(config);
    let mut failed = 0usize;
    for report in &reports {
        print!("{report}");
        if !report.passed() {
            failed += 1;
        }
    }

    if failed > 0 {
        error!(failed, "scenario run did not match the expected trace");
        std::process::exit(1);
    }
    info!(scenarios = reports.len(), "all scenarios passed");
}
