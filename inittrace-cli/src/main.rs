//! Command-line runner for the initialization-notification scenarios.

use std::process::ExitCode;

use clap::{ArgAction, Parser};
use inittrace::{LayoutKind, ScenarioConfig, ScenarioDriver};
use inittrace_pipeline::AccumulatePipeline;
use tracing::{error, info};

/// Run the reference pipeline against each output layout and verify the
/// initialization notifications it emits.
#[derive(Parser, Debug)]
#[command(name = "inittrace")]
#[command(version)]
#[command(long_about = r#"
Runs the two-stage reference pipeline once per output layout and checks that
every notification arrives in the expected order with the expected size, that
output contents are marked region by region from the base upwards, and that
the computed values are correct. Finishes with a run against an undersized
output, which must fail without marking anything.

Examples:
  inittrace
  inittrace --layout planar --layout sparse-chunky
  RUST_LOG=inittrace=trace inittrace --skip-error-case
"#)]
struct Cli {
    /// Layout to test; repeat to test several (default: all four)
    #[arg(short, long = "layout", value_name = "KIND")]
    layouts: Vec<LayoutKind>,

    /// Skip the undersized-output scenario
    #[arg(long)]
    skip_error_case: bool,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let layouts = if cli.layouts.is_empty() {
        LayoutKind::ALL.to_vec()
    } else {
        cli.layouts
    };

    let mut driver = ScenarioDriver::new(AccumulatePipeline::new(), ScenarioConfig::default());
    match driver.run_selected(&layouts, !cli.skip_error_case) {
        Ok(reports) => {
            for report in &reports {
                info!("{report}");
            }
            println!("Success!");
            ExitCode::SUCCESS
        }
        Err(err) if err.is_protocol_violation() => {
            error!(protocol = true, "{err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            error!("scenario failed: {err}");
            ExitCode::FAILURE
        }
    }
}
