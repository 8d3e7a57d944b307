use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use atol_qc_raw_ont::cli::RunArgs;
use atol_qc_raw_ont::engine::Snakemake;
use atol_qc_raw_ont::resources::{MissingResource, ResourceFiles};
use atol_qc_raw_ont::{exit_code_for, logging, run_pipeline};

fn main() -> ExitCode {
    // Usage errors exit here, before any lookup or engine work.
    let args = RunArgs::parse();

    let dispatch = logging::dispatch();
    logging::scoped(&dispatch, || match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err.downcast_ref::<MissingResource>().is_some() {
                eprintln!("installation error: {err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            exit_code_for(&err)
        }
    })
}

fn run(args: &RunArgs) -> Result<()> {
    tracing::info!(
        "{} version {}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    let resources = ResourceFiles::locate()?;
    let engine = Snakemake::from_env()?;
    run_pipeline(args, &resources, &engine)
}
