use clap::Parser;
use std::process::ExitCode;

use atol_qc_raw_ont::cli::RenderArgs;
use atol_qc_raw_ont::logging;
use atol_qc_raw_ont::report::{run_step, SKEW_DELAY};

fn main() -> ExitCode {
    let args = RenderArgs::parse();

    let dispatch = logging::dispatch();
    logging::scoped(&dispatch, || match run_step(&args, SKEW_DELAY) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    })
}
