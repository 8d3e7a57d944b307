//! Lookup of the workflow files bundled with the package.
//!
//! A missing file means a broken installation, so it gets its own error type
//! instead of being folded into usage errors.
use anyhow::Result;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Overrides the bundle root (the directory holding `Snakefile`).
pub const RESOURCES_ENV: &str = "ATOL_QC_RAW_ONT_RESOURCES";

const SNAKEFILE_REL: &str = "Snakefile";
const STATS_TEMPLATE_REL: &str = "report/stats.json";
const RENDER_STATS_BIN: &str = "render-stats";

/// The two read-only files every run needs, plus the report step binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFiles {
    pub snakefile: PathBuf,
    pub stats_template: PathBuf,
    /// `render-stats` executable the workflow rules call.
    pub render_stats: PathBuf,
}

/// A bundled resource could not be found in any candidate location.
#[derive(Debug)]
pub struct MissingResource {
    pub name: &'static str,
    pub searched: Vec<PathBuf>,
}

impl fmt::Display for MissingResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not find a {} (searched", self.name)?;
        for (idx, path) in self.searched.iter().enumerate() {
            let sep = if idx == 0 { " " } else { ", " };
            write!(f, "{sep}{}", path.display())?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for MissingResource {}

impl ResourceFiles {
    /// Locate the bundled workflow using the default search roots.
    pub fn locate() -> Result<Self> {
        Self::locate_in(&candidate_roots())
    }

    /// Locate both files under the first root that holds a Snakefile.
    ///
    /// The schema must sit in that same root; files from different installs
    /// are never mixed.
    pub fn locate_in(roots: &[PathBuf]) -> Result<Self> {
        let Some(root) = roots.iter().find(|root| root.join(SNAKEFILE_REL).is_file()) else {
            return Err(MissingResource {
                name: "Snakefile",
                searched: roots.iter().map(|root| root.join(SNAKEFILE_REL)).collect(),
            }
            .into());
        };
        let snakefile = root.join(SNAKEFILE_REL);
        tracing::debug!(path = %snakefile.display(), "using snakefile");

        let stats_template = root.join(STATS_TEMPLATE_REL);
        if !stats_template.is_file() {
            return Err(MissingResource {
                name: "stats_template",
                searched: vec![stats_template],
            }
            .into());
        }
        tracing::debug!(path = %stats_template.display(), "using stats_template");

        let render_stats = render_stats_binary();
        tracing::debug!(path = %render_stats.display(), "using render-stats");
        Ok(Self {
            snakefile,
            stats_template,
            render_stats,
        })
    }
}

/// The `render-stats` binary installed next to the running executable, or
/// the bare name (resolved through `PATH` by the rule shell) when there is none.
pub fn render_stats_binary() -> PathBuf {
    let name = format!("{RENDER_STATS_BIN}{}", env::consts::EXE_SUFFIX);
    env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&name)))
        .filter(|path| path.is_file())
        .unwrap_or_else(|| PathBuf::from(name))
}

/// Bundle roots in priority order.
///
/// An explicit override wins outright; otherwise the installed layouts next
/// to the executable are tried before the source tree.
pub fn candidate_roots() -> Vec<PathBuf> {
    if let Some(root) = env::var_os(RESOURCES_ENV).filter(|value| !value.is_empty()) {
        return vec![PathBuf::from(root)];
    }
    let mut roots = Vec::new();
    if let Some(exe_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        roots.push(exe_dir.join("workflow"));
        roots.push(
            exe_dir
                .join("..")
                .join("share")
                .join(env!("CARGO_PKG_NAME"))
                .join("workflow"),
        );
    }
    roots.push(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("workflow"));
    roots
}
