//! Dataset bootstrap, run once before any trial.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use et_types::{BootstrapError, TuneResult};

use crate::launcher::{Invocation, JobLauncher};

/// Environment variable overriding the dataset cache root.
pub const BASE_DIR_ENV: &str = "NANOCHAT_BASE_DIR";

/// `$NANOCHAT_BASE_DIR`, else `~/.cache/nanochat`.
pub fn default_base_dir() -> PathBuf {
    match std::env::var_os(BASE_DIR_ENV) {
        Some(dir) => PathBuf::from(dir),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("nanochat"),
    }
}

/// Number of `shard_*.parquet` files directly inside `data_dir`.
pub fn count_shards(data_dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(data_dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("shard_") && name.ends_with(".parquet")
        })
        .count()
}

/// First executable named `tool` on `PATH`.
pub fn find_on_path(tool: &str) -> Option<PathBuf> {
    find_in_search_path(tool, &std::env::var_os("PATH")?)
}

/// First executable named `tool` in a `PATH`-style directory list.
pub fn find_in_search_path(tool: &str, search_path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .map(|dir| dir.join(tool))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Makes sure enough dataset shards exist, downloading them if needed.
pub struct DatasetBootstrap {
    repo_root: PathBuf,
    base_dir: PathBuf,
    min_shards: usize,
    tool_lookup: fn(&str) -> Option<PathBuf>,
}

impl DatasetBootstrap {
    pub fn new(repo_root: impl Into<PathBuf>, min_shards: usize) -> Self {
        Self {
            repo_root: repo_root.into(),
            base_dir: default_base_dir(),
            min_shards,
            tool_lookup: find_on_path,
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_tool_lookup(mut self, lookup: fn(&str) -> Option<PathBuf>) -> Self {
        self.tool_lookup = lookup;
        self
    }

    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("base_data")
    }

    fn venv_activate(&self) -> PathBuf {
        self.repo_root.join(".venv").join("bin").join("activate")
    }

    pub async fn ensure<L: JobLauncher + ?Sized>(&self, launcher: &L) -> TuneResult<()> {
        let found = count_shards(&self.data_dir());
        if found >= self.min_shards {
            debug!("Found {found} dataset shards in {}", self.data_dir().display());
            return Ok(());
        }
        info!(
            "Dataset shards missing ({found} found). Bootstrapping environment and downloading {} shards...",
            self.min_shards
        );

        let activate = self.venv_activate();
        if !activate.exists() {
            let uv = (self.tool_lookup)("uv").ok_or_else(|| BootstrapError::MissingTool {
                tool: "uv".to_string(),
            })?;
            let sync = Invocation::new(uv.to_string_lossy())
                .args(["sync", "--extra", "gpu"])
                .current_dir(&self.repo_root);
            self.run_step(launcher, &sync).await?;
        }

        let script = format!(
            ". {} && python -m nanochat.dataset -n {}",
            activate.display(),
            self.min_shards
        );
        let download = Invocation::new("bash")
            .args(["-lc", script.as_str()])
            .current_dir(&self.repo_root);
        self.run_step(launcher, &download).await?;

        let found = count_shards(&self.data_dir());
        if found < self.min_shards {
            return Err(BootstrapError::InsufficientShards {
                found,
                required: self.min_shards,
            }
            .into());
        }
        Ok(())
    }

    async fn run_step<L: JobLauncher + ?Sized>(
        &self,
        launcher: &L,
        step: &Invocation,
    ) -> TuneResult<()> {
        info!("Bootstrap: {step}");
        let output = launcher.launch(step).await?;
        if !output.success {
            return Err(BootstrapError::CommandFailed {
                command: step.to_string(),
                code: output.exit_code,
            }
            .into());
        }
        Ok(())
    }
}
