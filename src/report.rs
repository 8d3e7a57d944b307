//! Stats report rendering: normalize, validate against the schema, write.
//!
//! The core is a plain function over explicit inputs; the `render-stats`
//! binary gathers those inputs from its command line.
use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::cli::RenderArgs;

/// Pause before touching files. Works around clock skew between compute
/// nodes and shared storage on HPC filesystems, see
/// <https://github.com/snakemake/snakemake/issues/3261>.
pub const SKEW_DELAY: Duration = Duration::from_secs(5);

pub const N50_KEY: &str = "n50_length";

/// Make sure optional stats the schema expects are present.
pub fn normalize_stats(stats: &mut Map<String, Value>) {
    if !stats.contains_key(N50_KEY) {
        stats.insert(N50_KEY.to_string(), Value::Null);
    }
}

/// Check `instance` against `schema`, collecting every violation.
pub fn validate_stats(instance: &Value, schema: &Value) -> Result<()> {
    let validator =
        jsonschema::validator_for(schema).map_err(|err| anyhow!("invalid stats schema: {err}"))?;
    let problems: Vec<String> = validator
        .iter_errors(instance)
        .map(|err| {
            let location = err.instance_path.to_string();
            if location.is_empty() {
                err.to_string()
            } else {
                format!("{location}: {err}")
            }
        })
        .collect();
    if problems.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "stats failed schema validation:\n  {}",
        problems.join("\n  ")
    ))
}

/// Normalize and validate `stats`, then write it to `output` as one JSON line.
///
/// Nothing is written unless validation passes, and the output only appears
/// once it is complete.
pub fn render_report(
    mut stats: Map<String, Value>,
    schema: &Value,
    output: &Path,
) -> Result<Value> {
    normalize_stats(&mut stats);
    let stats = Value::Object(stats);
    validate_stats(&stats, schema)?;

    let mut text = serde_json::to_string(&stats).context("serialize stats")?;
    text.push('\n');
    write_atomic(output, text.as_bytes())?;
    tracing::info!(path = %output.display(), "wrote stats");
    Ok(stats)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".render-stats-")
        .tempfile_in(parent)
        .with_context(|| format!("stage output in {}", parent.display()))?;
    staged
        .write_all(bytes)
        .with_context(|| format!("write staged {}", staged.path().display()))?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Load a JSON document from disk.
pub fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
}

/// Collect the stats object from `--stats-json` and `--stat` entries.
pub fn gather_stats(args: &RenderArgs) -> Result<Map<String, Value>> {
    let mut stats = match &args.stats_json {
        Some(path) => match read_json(path)? {
            Value::Object(map) => map,
            other => {
                return Err(anyhow!(
                    "{} must hold a JSON object, found {}",
                    path.display(),
                    json_kind(&other)
                ))
            }
        },
        None => Map::new(),
    };
    for (key, value) in &args.stat {
        stats.insert(key.clone(), value.clone());
    }
    Ok(stats)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Full step: wait out clock skew, then gather, render and write.
pub fn run_step(args: &RenderArgs, delay: Duration) -> Result<()> {
    if !delay.is_zero() {
        tracing::debug!(delay_ms = delay.as_millis(), "waiting for filesystem clocks");
        std::thread::sleep(delay);
    }
    let stats = gather_stats(args)?;
    let schema = read_json(&args.schema)?;
    render_report(stats, &schema, &args.output)?;
    Ok(())
}
