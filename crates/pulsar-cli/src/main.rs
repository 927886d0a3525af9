mod cli;
mod error;
mod logging;
mod plan;
mod run;

use crate::cli::Cli;
use crate::error::Result;
use crate::logging::LogSettings;
use crate::plan::Plan;
use crate::run::RunReport;
use clap::Parser;
use tracing::{debug, error, info};

/// Exit status of a run that could not execute its plan.
const FRAMEWORK_FAILURE: i32 = -1;

fn main() {
    let cli = Cli::parse();
    let settings = LogSettings {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        debug: cli.debug,
        color: cli.color,
    };
    if let Err(e) = logging::setup_logging(settings, cli.log_file.as_deref()) {
        eprintln!("❌ Error: {}", e);
        std::process::exit(FRAMEWORK_FAILURE);
    }

    let code = match run_app(&cli) {
        Ok(report) => {
            let code = report.exit_code();
            if code == 0 {
                info!("✅ Every test behaved as expected.");
            } else {
                error!("❌ Unexpected test outcomes for: {}", report.unexpected.join(", "));
            }
            println!(
                "{} passed, {} failed as expected, {} unexpected",
                report.passed,
                report.expected_failures,
                report.unexpected.len()
            );
            code
        }
        Err(e) => {
            error!("❌ Run failed: {}", e);
            eprintln!("❌ Run failed: {}", e);
            FRAMEWORK_FAILURE
        }
    };
    std::process::exit(code);
}

fn run_app(cli: &Cli) -> Result<RunReport> {
    info!("🚀 Pulsar launcher v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", cli);

    let config = run::runtime_config(cli)?;
    let plan = Plan::from_file(&cli.plan)?;
    run::run(&config, &plan)
}
