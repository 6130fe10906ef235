//! Run configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use et_optimizer::RefinementPlan;
use et_types::{config_error, Profile, TuneResult};

/// Directory, relative to the repository root, holding logs and the summary.
pub const LOG_DIR_NAME: &str = "autotune_logs";

/// File name of the run summary inside [`LOG_DIR_NAME`].
pub const SUMMARY_FILE_NAME: &str = "eve_summary.json";

/// Top-level configuration for a tuning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    pub profile: Profile,

    /// Number of stage-1 candidates, baseline included.
    pub stage1_trials: usize,

    /// Iteration budget per stage-1 trial.
    pub stage1_iters: u32,

    /// Iteration budget per stage-2 trial. Must exceed `stage1_iters`.
    pub stage2_iters: u32,

    pub seed: u64,

    /// Keep per-trial logs on disk after their metrics are parsed.
    pub keep_logs: bool,

    /// Evaluation-token budget passed to every job.
    pub eval_tokens: u64,

    /// Flags forwarded verbatim to the training job.
    pub extra_flags: Vec<String>,

    /// How many stage-1 trials survive into stage 2.
    pub top_k: usize,

    /// How survivors are expanded into stage-2 candidates.
    pub refinement: RefinementPlan,

    /// Repository root; jobs run here and logs land under it.
    pub repo_root: PathBuf,

    pub skip_bootstrap: bool,

    /// Dataset shards required before any trial runs.
    pub min_shards: usize,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            profile: Profile::H100,
            stage1_trials: 4,
            stage1_iters: 2500,
            stage2_iters: 5000,
            seed: 1337,
            keep_logs: false,
            eval_tokens: 16_384,
            extra_flags: Vec::new(),
            top_k: 2,
            refinement: RefinementPlan::default(),
            repo_root: PathBuf::from("."),
            skip_bootstrap: false,
            min_shards: 16,
        }
    }
}

impl TuneConfig {
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_stage1(mut self, trials: usize, iters: u32) -> Self {
        self.stage1_trials = trials;
        self.stage1_iters = iters;
        self
    }

    pub fn with_stage2_iters(mut self, iters: u32) -> Self {
        self.stage2_iters = iters;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_keep_logs(mut self, keep: bool) -> Self {
        self.keep_logs = keep;
        self
    }

    pub fn with_eval_tokens(mut self, tokens: u64) -> Self {
        self.eval_tokens = tokens;
        self
    }

    pub fn with_extra_flags(mut self, flags: Vec<String>) -> Self {
        self.extra_flags = flags;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_repo_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.repo_root = root.into();
        self
    }

    pub fn with_bootstrap(mut self, skip: bool, min_shards: usize) -> Self {
        self.skip_bootstrap = skip;
        self.min_shards = min_shards;
        self
    }

    pub fn log_dir(&self) -> PathBuf {
        self.repo_root.join(LOG_DIR_NAME)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.log_dir().join(SUMMARY_FILE_NAME)
    }

    pub fn validate(&self) -> TuneResult<()> {
        if self.stage1_trials == 0 {
            return Err(config_error!("stage1_trials must be at least 1"));
        }
        if self.stage1_iters == 0 {
            return Err(config_error!("stage1_iters must be at least 1"));
        }
        if self.stage2_iters <= self.stage1_iters {
            return Err(config_error!(
                "stage2_iters ({}) must be larger than stage1_iters ({})",
                self.stage2_iters,
                self.stage1_iters
            ));
        }
        if self.top_k == 0 {
            return Err(config_error!("top_k must be at least 1"));
        }
        if self.eval_tokens == 0 {
            return Err(config_error!("eval_tokens must be positive"));
        }
        Ok(())
    }
}
