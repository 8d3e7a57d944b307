//! Settings handed to the workflow engine for one run.
//!
//! Each group mirrors one concern of the engine: status output, resource
//! budget, rerun policy, execution, and the rule parameter namespace.
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::cli::{ReadsInput, RunArgs};
use crate::resources::ResourceFiles;

/// Engine status chatter that can be silenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Quietness {
    Host,
    Reason,
    Progress,
}

impl Quietness {
    pub fn as_str(self) -> &'static str {
        match self {
            Quietness::Host => "host",
            Quietness::Reason => "reason",
            Quietness::Progress => "progress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub quiet: BTreeSet<Quietness>,
    /// Echo each step's shell command so runs stay auditable.
    pub print_shell_commands: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            quiet: BTreeSet::from([Quietness::Host, Quietness::Reason, Quietness::Progress]),
            print_shell_commands: true,
        }
    }
}

/// Threads and memory available to the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudget {
    pub cores: u32,
    pub mem_mb: u64,
}

impl ResourceBudget {
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let mem_mb = args
            .mem_gb
            .checked_mul(1024)
            .with_context(|| format!("memory budget of {} GB is too large", args.mem_gb))?;
        Ok(Self {
            cores: args.threads,
            mem_mb,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceScope {
    /// Shared by all concurrently running steps.
    Global,
}

impl ResourceScope {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceScope::Global => "global",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSettings {
    pub cores: u32,
    pub mem_mb: u64,
    /// Scope overrides keyed by resource name.
    pub scopes: Vec<(String, ResourceScope)>,
}

impl From<ResourceBudget> for ResourceSettings {
    fn from(budget: ResourceBudget) -> Self {
        Self {
            cores: budget.cores,
            mem_mb: budget.mem_mb,
            scopes: vec![
                ("mem".to_string(), ResourceScope::Global),
                ("threads".to_string(), ResourceScope::Global),
            ],
        }
    }
}

/// Kinds of change that make the engine rerun a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RerunTrigger {
    /// A step's declared input files changed.
    Input,
}

impl RerunTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            RerunTrigger::Input => "input",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagSettings {
    pub rerun_triggers: BTreeSet<RerunTrigger>,
}

impl Default for DagSettings {
    /// Only changed inputs trigger reruns; code or parameter edits do not.
    fn default() -> Self {
        Self {
            rerun_triggers: BTreeSet::from([RerunTrigger::Input]),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Off by default: callers must not run two pipelines against the same outputs.
    pub lock: bool,
}

/// Parameter namespace visible to the workflow rules as `config`.
///
/// Field names are the keys the rules read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSettings {
    pub min_length: u64,
    pub threads: u32,
    pub mem_gb: u64,
    pub dry_run: bool,
    pub reads_tarfile: Option<PathBuf>,
    pub reads: Option<Vec<PathBuf>>,
    pub reads_out: PathBuf,
    pub stats: PathBuf,
    pub logs_directory: Option<PathBuf>,
    pub stats_template: PathBuf,
    pub render_stats_bin: PathBuf,
}

impl ConfigSettings {
    /// Every parsed option plus the bundled schema and report step paths.
    pub fn from_args(args: &RunArgs, resources: &ResourceFiles) -> Result<Self> {
        let (reads_tarfile, reads) = match args.reads()? {
            ReadsInput::Tarfile(path) => (Some(path.to_path_buf()), None),
            ReadsInput::Fastq(paths) => (None, Some(paths.to_vec())),
        };
        Ok(Self {
            min_length: args.min_length,
            threads: args.threads,
            mem_gb: args.mem_gb,
            dry_run: args.dry_run,
            reads_tarfile,
            reads,
            reads_out: args.reads_out.clone(),
            stats: args.stats.clone(),
            logs_directory: args.logs_directory.clone(),
            stats_template: resources.stats_template.clone(),
            render_stats_bin: resources.render_stats.clone(),
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).context("serialize workflow config")
    }
}

/// Everything the engine needs for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowSettings {
    pub output: OutputSettings,
    pub resources: ResourceSettings,
    pub dag: DagSettings,
    pub execution: ExecutionSettings,
    pub config: ConfigSettings,
}

impl WorkflowSettings {
    pub fn assemble(args: &RunArgs, resources: &ResourceFiles) -> Result<Self> {
        let budget = ResourceBudget::from_args(args)?;
        Ok(Self {
            output: OutputSettings::default(),
            resources: budget.into(),
            dag: DagSettings::default(),
            execution: ExecutionSettings::default(),
            config: ConfigSettings::from_args(args, resources)?,
        })
    }
}
