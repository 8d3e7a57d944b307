//! Bridge to the external workflow engine.
//!
//! The engine is a black box that builds a job graph from a workflow
//! definition plus settings and executes it. `Session`, `Workflow` and `Dag`
//! translate the settings bundle into engine arguments step by step; the
//! `WorkflowEngine` implementation only has to launch the final command.
use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tempfile::TempDir;

use crate::settings::{
    ConfigSettings, DagSettings, ExecutionSettings, OutputSettings, ResourceSettings,
};

/// Overrides the engine command, e.g. `"python -m snakemake"`.
pub const ENGINE_ENV: &str = "ATOL_SNAKEMAKE";

const DEFAULT_ENGINE: &str = "snakemake";
const CONFIG_FILE_NAME: &str = "config.json";

/// How the job graph gets executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Report the planned jobs without running any of them.
    DryRun,
    /// Run jobs on this machine within the resource budget.
    Local,
}

/// Engine arguments assembled for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<OsString>,
}

impl Invocation {
    fn push(&mut self, arg: impl Into<OsString>) {
        self.args.push(arg.into());
    }

    /// Arguments as lossy strings, for logging and assertions.
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

/// Final status reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    /// Exit code, `None` when the engine was killed by a signal.
    pub code: Option<i32>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn into_result(self) -> Result<()> {
        if self.success() {
            return Ok(());
        }
        Err(EngineFailed { code: self.code }.into())
    }
}

/// The engine ran but reported failure.
#[derive(Debug)]
pub struct EngineFailed {
    pub code: Option<i32>,
}

impl EngineFailed {
    /// Exit status to hand back to our caller; never zero.
    pub fn exit_status(&self) -> u8 {
        self.code
            .and_then(|code| u8::try_from(code).ok())
            .filter(|code| *code != 0)
            .unwrap_or(1)
    }
}

impl fmt::Display for EngineFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "workflow failed with exit status {code}"),
            None => write!(f, "workflow was terminated by a signal"),
        }
    }
}

impl std::error::Error for EngineFailed {}

/// Something that can run an assembled engine invocation.
pub trait WorkflowEngine {
    /// Run the engine with `invocation` and wait for it to finish.
    fn launch(&self, invocation: &Invocation) -> Result<RunOutcome>;

    /// Open a session; its scratch space is removed when it drops.
    fn open(&self, output: &OutputSettings) -> Result<Session<'_, Self>>
    where
        Self: Sized,
    {
        Session::open(self, output)
    }
}

/// Scoped engine session owning the scratch directory for generated files.
pub struct Session<'e, E: WorkflowEngine> {
    engine: &'e E,
    output: OutputSettings,
    scratch: TempDir,
}

impl<'e, E: WorkflowEngine> Session<'e, E> {
    pub fn open(engine: &'e E, output: &OutputSettings) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("atol-qc-raw-ont-")
            .tempdir()
            .context("create engine session directory")?;
        Ok(Self {
            engine,
            output: output.clone(),
            scratch,
        })
    }

    /// Load the workflow definition with its resources and parameters.
    pub fn workflow(
        &self,
        snakefile: &Path,
        resources: &ResourceSettings,
        config: &ConfigSettings,
    ) -> Result<Workflow<'_, E>> {
        let config_path = self.write_config(config)?;

        let mut invocation = Invocation::default();
        invocation.push("--snakefile");
        invocation.push(snakefile);
        invocation.push("--configfile");
        invocation.push(&config_path);
        invocation.push("--cores");
        invocation.push(resources.cores.to_string());
        invocation.push("--resources");
        invocation.push(format!("mem_mb={}", resources.mem_mb));
        if !resources.scopes.is_empty() {
            invocation.push("--set-resource-scopes");
            for (name, scope) in &resources.scopes {
                invocation.push(format!("{name}={}", scope.as_str()));
            }
        }
        if !self.output.quiet.is_empty() {
            invocation.push("--quiet");
            for quiet in &self.output.quiet {
                invocation.push(quiet.as_str());
            }
        }
        if self.output.print_shell_commands {
            invocation.push("--printshellcmds");
        }

        Ok(Workflow {
            session: self,
            invocation,
        })
    }

    fn write_config(&self, config: &ConfigSettings) -> Result<PathBuf> {
        let path = self.scratch.path().join(CONFIG_FILE_NAME);
        let value = config.to_value()?;
        let text = serde_json::to_string_pretty(&value).context("serialize config")?;
        fs::write(&path, text.as_bytes())
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// A loaded workflow definition, ready for graph construction.
pub struct Workflow<'s, E: WorkflowEngine> {
    session: &'s Session<'s, E>,
    invocation: Invocation,
}

impl<'s, E: WorkflowEngine> Workflow<'s, E> {
    /// Build the job graph under the given rerun policy.
    pub fn dag(self, settings: &DagSettings) -> Dag<'s, E> {
        let mut invocation = self.invocation;
        if !settings.rerun_triggers.is_empty() {
            invocation.push("--rerun-triggers");
            for trigger in &settings.rerun_triggers {
                invocation.push(trigger.as_str());
            }
        }
        Dag {
            session: self.session,
            invocation,
        }
    }
}

/// A job graph awaiting execution.
pub struct Dag<'s, E: WorkflowEngine> {
    session: &'s Session<'s, E>,
    invocation: Invocation,
}

impl<'s, E: WorkflowEngine> Dag<'s, E> {
    /// The invocation that `execute` would launch for `executor`.
    pub fn invocation(&self, executor: ExecutorKind, settings: &ExecutionSettings) -> Invocation {
        let mut invocation = self.invocation.clone();
        if !settings.lock {
            invocation.push("--nolock");
        }
        if executor == ExecutorKind::DryRun {
            invocation.push("--dry-run");
        }
        invocation
    }

    pub fn execute(self, executor: ExecutorKind, settings: &ExecutionSettings) -> Result<RunOutcome> {
        let invocation = self.invocation(executor, settings);
        tracing::debug!(?executor, "executing workflow");
        self.session.engine.launch(&invocation)
    }
}

/// The snakemake command line tool.
#[derive(Debug, Clone)]
pub struct Snakemake {
    command: Vec<String>,
}

impl Snakemake {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(anyhow!("engine command is empty"));
        }
        Ok(Self { command })
    }

    /// Use `$ATOL_SNAKEMAKE` when set, else `snakemake` from `PATH`.
    pub fn from_env() -> Result<Self> {
        if let Ok(value) = std::env::var(ENGINE_ENV) {
            if !value.trim().is_empty() {
                let command = shell_words::split(&value)
                    .with_context(|| format!("parse {ENGINE_ENV}: {value}"))?;
                return Self::new(command);
            }
        }
        let program = which::which(DEFAULT_ENGINE)
            .with_context(|| format!("could not find {DEFAULT_ENGINE} on PATH"))?;
        Self::new(vec![program.display().to_string()])
    }
}

impl WorkflowEngine for Snakemake {
    fn launch(&self, invocation: &Invocation) -> Result<RunOutcome> {
        let (program, prefix) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("engine command is empty"))?;

        let rendered = shell_words::join(
            self.command
                .iter()
                .cloned()
                .chain(invocation.display_args()),
        );
        tracing::info!(command = %rendered, "launching workflow engine");

        let start = Instant::now();
        let status = Command::new(program)
            .args(prefix)
            .args(&invocation.args)
            .status()
            .with_context(|| format!("spawn workflow engine: {program}"))?;
        let elapsed_ms = start.elapsed().as_millis();

        tracing::info!(elapsed_ms, code = ?status.code(), "workflow engine finished");
        Ok(RunOutcome {
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{Quietness, RerunTrigger, ResourceBudget, ResourceScope};
    use serde_json::Value;
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    struct RecordingEngine {
        code: Option<i32>,
        launched: RefCell<Vec<Invocation>>,
        config_seen: RefCell<Option<(PathBuf, String)>>,
    }

    impl RecordingEngine {
        fn new(code: Option<i32>) -> Self {
            Self {
                code,
                launched: RefCell::new(Vec::new()),
                config_seen: RefCell::new(None),
            }
        }
    }

    impl WorkflowEngine for RecordingEngine {
        fn launch(&self, invocation: &Invocation) -> Result<RunOutcome> {
            let args = invocation.display_args();
            if let Some(idx) = args.iter().position(|arg| arg == "--configfile") {
                let path = PathBuf::from(&args[idx + 1]);
                let text = fs::read_to_string(&path).expect("config readable during launch");
                *self.config_seen.borrow_mut() = Some((path, text));
            }
            self.launched.borrow_mut().push(invocation.clone());
            Ok(RunOutcome { code: self.code })
        }
    }

    fn resources() -> ResourceSettings {
        ResourceBudget {
            cores: 8,
            mem_mb: 4096,
        }
        .into()
    }

    fn config() -> ConfigSettings {
        ConfigSettings {
            min_length: 1,
            threads: 8,
            mem_gb: 4,
            dry_run: false,
            reads_tarfile: Some(PathBuf::from("r.tar")),
            reads: None,
            reads_out: PathBuf::from("out.fastq.gz"),
            stats: PathBuf::from("s.json"),
            logs_directory: None,
            stats_template: PathBuf::from("/wf/report/stats.json"),
            render_stats_bin: PathBuf::from("/wf/render-stats"),
        }
    }

    fn run(engine: &RecordingEngine, executor: ExecutorKind) -> Result<RunOutcome> {
        let session = engine.open(&OutputSettings::default())?;
        let workflow = session.workflow(Path::new("/wf/Snakefile"), &resources(), &config())?;
        workflow
            .dag(&DagSettings::default())
            .execute(executor, &ExecutionSettings::default())
    }

    fn position(args: &[String], flag: &str) -> usize {
        args.iter()
            .position(|arg| arg == flag)
            .unwrap_or_else(|| panic!("missing {flag} in {args:?}"))
    }

    #[test]
    fn local_run_translates_every_setting() {
        let engine = RecordingEngine::new(Some(0));
        let outcome = run(&engine, ExecutorKind::Local).expect("run");
        assert!(outcome.success());

        let launched = engine.launched.borrow();
        assert_eq!(launched.len(), 1);
        let args = launched[0].display_args();

        let at = position(&args, "--snakefile");
        assert_eq!(args[at + 1], "/wf/Snakefile");
        let at = position(&args, "--cores");
        assert_eq!(args[at + 1], "8");
        let at = position(&args, "--resources");
        assert_eq!(args[at + 1], "mem_mb=4096");
        let at = position(&args, "--set-resource-scopes");
        assert_eq!(args[at + 1..at + 3], ["mem=global", "threads=global"]);
        let at = position(&args, "--rerun-triggers");
        assert_eq!(args[at + 1], "input");
        let at = position(&args, "--quiet");
        assert_eq!(args[at + 1..at + 4], ["host", "reason", "progress"]);
        position(&args, "--printshellcmds");
        position(&args, "--nolock");
        assert!(!args.iter().any(|arg| arg == "--dry-run"));
    }

    #[test]
    fn dry_run_adds_dry_run_flag() {
        let engine = RecordingEngine::new(Some(0));
        run(&engine, ExecutorKind::DryRun).expect("run");
        let args = engine.launched.borrow()[0].display_args();
        assert_eq!(args.last().map(String::as_str), Some("--dry-run"));
    }

    #[test]
    fn config_file_lives_only_as_long_as_the_session() {
        let engine = RecordingEngine::new(Some(0));
        run(&engine, ExecutorKind::Local).expect("run");

        let (path, text) = engine.config_seen.borrow_mut().take().expect("config seen");
        let parsed: Value = serde_json::from_str(&text).expect("config is JSON");
        assert_eq!(parsed, config().to_value().expect("config value"));
        assert_eq!(parsed["reads_out"], "out.fastq.gz");
        assert_eq!(parsed["render_stats_bin"], "/wf/render-stats");
        assert!(!path.exists(), "session scratch should be removed");
    }

    #[test]
    fn scratch_is_removed_when_engine_fails() {
        let engine = RecordingEngine::new(Some(2));
        let err = run(&engine, ExecutorKind::Local)
            .expect("launch ok")
            .into_result()
            .expect_err("engine failure");
        let failed = err.downcast_ref::<EngineFailed>().expect("typed failure");
        assert_eq!(failed.exit_status(), 2);

        let (path, _) = engine.config_seen.borrow_mut().take().expect("config seen");
        assert!(!path.exists());
    }

    #[test]
    fn empty_settings_add_no_flags() {
        let engine = RecordingEngine::new(Some(0));
        let output = OutputSettings {
            quiet: BTreeSet::new(),
            print_shell_commands: false,
        };
        let session = engine.open(&output).expect("open");
        let resources = ResourceSettings {
            cores: 1,
            mem_mb: 1024,
            scopes: Vec::new(),
        };
        let dag = session
            .workflow(Path::new("Snakefile"), &resources, &config())
            .expect("workflow")
            .dag(&DagSettings {
                rerun_triggers: BTreeSet::new(),
            });
        let args = dag
            .invocation(ExecutorKind::Local, &ExecutionSettings { lock: true })
            .display_args();
        for flag in [
            "--quiet",
            "--printshellcmds",
            "--set-resource-scopes",
            "--rerun-triggers",
            "--nolock",
        ] {
            assert!(!args.iter().any(|arg| arg == flag), "{flag} present");
        }
    }

    #[test]
    fn signal_termination_maps_to_failure_status() {
        let failed = EngineFailed { code: None };
        assert_eq!(failed.exit_status(), 1);
        assert_eq!(failed.to_string(), "workflow was terminated by a signal");
        assert_eq!(EngineFailed { code: Some(300) }.exit_status(), 1);
    }

    #[test]
    fn snakemake_command_must_not_be_empty() {
        assert!(Snakemake::new(Vec::new()).is_err());
        assert!(Snakemake::new(vec!["python".into(), "-m".into(), "snakemake".into()]).is_ok());
    }

    #[test]
    fn scope_and_trigger_names_match_engine_vocabulary() {
        assert_eq!(ResourceScope::Global.as_str(), "global");
        assert_eq!(RerunTrigger::Input.as_str(), "input");
        assert_eq!(Quietness::Progress.as_str(), "progress");
    }
}
