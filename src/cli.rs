//! CLI argument parsing for the QC launcher and the stats render step.
//!
//! Parsing stays free of I/O so usage errors are reported before any
//! resource lookup or engine interaction.
use anyhow::{anyhow, Result};
use clap::{ArgGroup, Parser};
use std::path::{Path, PathBuf};

/// Options for a single QC run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "atol-qc-raw-ont",
    version,
    about = "Quality control for raw ONT reads",
    group(
        ArgGroup::new("reads_input")
            .required(true)
            .multiple(false)
            .args(["reads_tarfile", "reads"])
    )
)]
pub struct RunArgs {
    /// Minimum length read to output. Default is 1, i.e. keep all reads.
    #[arg(
        long = "min-length",
        value_name = "N",
        default_value_t = 1,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub min_length: u64,

    #[arg(short = 't', long = "threads", default_value_t = 16)]
    pub threads: u32,

    /// Intended maximum RAM in GB. NOTE: some steps (e.g. filtlong) don't
    /// allow memory usage to be specified by the user.
    #[arg(short = 'm', long = "mem", value_name = "GB", default_value_t = 32)]
    pub mem_gb: u64,

    /// Dry run
    #[arg(short = 'n')]
    pub dry_run: bool,

    /// Reads in a single tarfile. Will be searched for filenames ending in fastq.gz.
    #[arg(long = "tarfile", value_name = "PATH", help_heading = "Input")]
    pub reads_tarfile: Option<PathBuf>,

    /// Reads in fastq.gz. Multiple files are accepted.
    #[arg(
        long = "fastqfiles",
        value_name = "PATH",
        num_args = 1..,
        help_heading = "Input"
    )]
    pub reads: Option<Vec<PathBuf>>,

    /// Combined output in fastq.gz
    #[arg(long = "out", value_name = "PATH", help_heading = "Output")]
    pub reads_out: PathBuf,

    /// Stats output (json)
    #[arg(long = "stats", value_name = "PATH", help_heading = "Output")]
    pub stats: PathBuf,

    /// Log output directory. Default: logs are discarded.
    #[arg(long = "logs", value_name = "DIR", help_heading = "Output")]
    pub logs_directory: Option<PathBuf>,
}

/// Where the raw reads come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadsInput<'a> {
    Tarfile(&'a Path),
    Fastq(&'a [PathBuf]),
}

impl RunArgs {
    /// The reads source. Exactly one form must be present; clap enforces
    /// this for parsed arguments.
    pub fn reads(&self) -> Result<ReadsInput<'_>> {
        match (&self.reads_tarfile, &self.reads) {
            (Some(tarfile), None) => Ok(ReadsInput::Tarfile(tarfile)),
            (None, Some(reads)) if !reads.is_empty() => Ok(ReadsInput::Fastq(reads)),
            _ => Err(anyhow!(
                "exactly one of --tarfile or --fastqfiles (with at least one path) is required"
            )),
        }
    }
}

/// Options for the `render-stats` workflow step.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "render-stats",
    version,
    about = "Validate a QC stats object against its schema and write it as JSON",
    group(
        ArgGroup::new("stats_source")
            .required(true)
            .multiple(true)
            .args(["stats_json", "stat"])
    )
)]
pub struct RenderArgs {
    /// JSON schema the stats must satisfy
    #[arg(long, value_name = "PATH")]
    pub schema: PathBuf,

    /// Where to write the validated stats
    #[arg(long, value_name = "PATH")]
    pub output: PathBuf,

    /// File holding the stats as a JSON object
    #[arg(long = "stats-json", value_name = "PATH")]
    pub stats_json: Option<PathBuf>,

    /// Single stat as KEY=VALUE; VALUE is parsed as JSON, else kept as a string
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_stat)]
    pub stat: Vec<(String, serde_json::Value)>,
}

fn parse_stat(raw: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty stat name in {raw:?}"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
