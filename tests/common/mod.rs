//! Shared test infrastructure for integration tests.
//!
//! A small shell script stands in for snakemake: it records the arguments it
//! was given, copies the generated config file, and exits with a chosen status.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const FAKE_ENGINE: &str = r#"
printf '%s\n' "$@" > "$FAKE_ENGINE_ARGS"
while [ $# -gt 0 ]; do
  if [ "$1" = "--configfile" ]; then
    cp "$2" "$FAKE_ENGINE_CONFIG"
  fi
  shift
done
exit "${FAKE_ENGINE_EXIT:-0}"
"#;

/// Temp workspace with a fake engine and paths for inputs and outputs.
pub struct Fixture {
    pub dir: TempDir,
    pub engine_exit: i32,
    pub resources: PathBuf,
}

impl Fixture {
    pub fn create() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        fs::write(dir.path().join("fake_engine.sh"), FAKE_ENGINE).expect("write fake engine");
        Self {
            dir,
            engine_exit: 0,
            resources: bundled_resources(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn args_log(&self) -> PathBuf {
        self.path("engine_args.txt")
    }

    pub fn config_copy(&self) -> PathBuf {
        self.path("engine_config.json")
    }

    /// Arguments the fake engine saw, or `None` if it never ran.
    pub fn engine_args(&self) -> Option<Vec<String>> {
        let text = fs::read_to_string(self.args_log()).ok()?;
        Some(text.lines().map(str::to_string).collect())
    }

    pub fn engine_config(&self) -> serde_json::Value {
        let text = fs::read_to_string(self.config_copy()).expect("read copied config");
        serde_json::from_str(&text).expect("parse copied config")
    }

    pub fn run(&self, args: &[&str]) -> Output {
        let engine = shell_words::join([
            "sh".to_string(),
            self.path("fake_engine.sh").display().to_string(),
        ]);
        Command::new(env!("CARGO_BIN_EXE_atol-qc-raw-ont"))
            .args(args)
            .current_dir(self.dir.path())
            .env("ATOL_SNAKEMAKE", engine)
            .env("ATOL_QC_RAW_ONT_RESOURCES", &self.resources)
            .env("FAKE_ENGINE_ARGS", self.args_log())
            .env("FAKE_ENGINE_CONFIG", self.config_copy())
            .env("FAKE_ENGINE_EXIT", self.engine_exit.to_string())
            .env("RUST_LOG", "debug")
            .output()
            .expect("run atol-qc-raw-ont")
    }
}

pub fn bundled_resources() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflow")
}

pub fn bundled_schema() -> PathBuf {
    bundled_resources().join("report").join("stats.json")
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent directory");
    }
    fs::write(path, contents.as_bytes()).expect("write file");
}
