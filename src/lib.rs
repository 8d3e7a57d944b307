//! Launcher for the raw ONT read QC workflow.
//!
//! The heavy lifting (read filtering, stats) happens in workflow rules run by
//! snakemake. This crate parses the user's options, locates the bundled
//! workflow files, hands a settings bundle to the engine, and provides the
//! `render-stats` step that validates the final stats JSON.
pub mod cli;
pub mod engine;
pub mod logging;
pub mod report;
pub mod resources;
pub mod settings;

use anyhow::Result;
use std::process::ExitCode;

use crate::cli::RunArgs;
use crate::engine::{EngineFailed, ExecutorKind, WorkflowEngine};
use crate::resources::{MissingResource, ResourceFiles};
use crate::settings::WorkflowSettings;

/// Exit status for a broken installation (bundled workflow files missing).
pub const EXIT_INSTALLATION: u8 = 3;

/// Run the pipeline described by `args` through `engine`.
///
/// A failing engine surfaces as [`EngineFailed`] carrying its exit status.
pub fn run_pipeline<E: WorkflowEngine>(
    args: &RunArgs,
    resources: &ResourceFiles,
    engine: &E,
) -> Result<()> {
    tracing::debug!(?args, "entrypoint args");

    let settings = WorkflowSettings::assemble(args, resources)?;
    let executor = if args.dry_run {
        ExecutorKind::DryRun
    } else {
        ExecutorKind::Local
    };

    let session = engine.open(&settings.output)?;
    let workflow = session.workflow(
        &resources.snakefile,
        &settings.resources,
        &settings.config,
    )?;
    let dag = workflow.dag(&settings.dag);
    let outcome = dag.execute(executor, &settings.execution)?;
    outcome.into_result()
}

/// Map a top-level error to the process exit status.
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<MissingResource>().is_some() {
        return ExitCode::from(EXIT_INSTALLATION);
    }
    if let Some(failed) = err.downcast_ref::<EngineFailed>() {
        return ExitCode::from(failed.exit_status());
    }
    ExitCode::FAILURE
}
