//! CLI entry point for the highway network metrics tool.
//!
//! Reads the loaded-network export, joins the non-recurring delay,
//! collision, and emission rate lookups selected by `--filter` and
//! `--year`, and writes VMT/VHT metrics by time period and vehicle class.

use clap::Parser;
use hwynet::lookup::{self, LookupMiss};
use hwynet::output;
use hwynet::pipeline::{self, RunConfig};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hwynet")]
#[command(
    about = "Computes VMT, VHT, freeflow time, non-recurring delay, collision and \
             emission metrics from a loaded network export",
    long_about = None
)]
struct Cli {
    /// Filter keyword selecting rows from the lookup tables
    #[arg(long, value_name = "lookup_filter")]
    filter: String,

    /// Year selecting rows from the lookup tables
    #[arg(long, value_name = "year")]
    year: i32,

    /// Loaded network export with vehicle class volumes
    #[arg(value_name = "avgload5period_vehclasses.csv")]
    net_csv: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = RunConfig {
        net_csv: &cli.net_csv,
        lookup_dir: Path::new(lookup::LOOKUP_DIR),
        output_path: Path::new(output::OUTPUT_FILE),
        filter: &cli.filter,
        year: cli.year,
    };

    match pipeline::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.downcast_ref::<LookupMiss>().is_some() => {
            error!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
