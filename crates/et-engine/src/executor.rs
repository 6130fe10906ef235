//! Trial execution: build the job command, run it, read back the metric.

use std::path::PathBuf;
use tracing::{error, info, warn};

use et_optimizer::{Trial, TrialFailure, TrialOutcome, TrialReport};
use et_types::{ParameterSet, Profile, Stage, TuneResult, TOTAL_BATCH_SIZE};

use crate::config::TuneConfig;
use crate::launcher::{Invocation, JobLauncher};
use crate::logs::LogStore;
use crate::metrics::MetricExtractor;

pub const JOB_PROGRAM: &str = "torchrun";
pub const MODEL_DEPTH: u32 = 12;
pub const MODEL_TAG: &str = "autotune_eve";
pub const EVE_EPS: &str = "1e-8";

/// Environment the training job expects, applied only where unset.
pub const JOB_ENV_DEFAULTS: [(&str, &str); 2] =
    [("WANDB_RUN", "dummy"), ("OMP_NUM_THREADS", "1")];

/// The subset of [`JOB_ENV_DEFAULTS`] that `lookup` reports as unset.
pub fn missing_env_defaults<F>(lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    JOB_ENV_DEFAULTS
        .iter()
        .filter(|(key, _)| lookup(key).is_none())
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Settings shared by every trial of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialSettings {
    pub profile: Profile,
    pub eval_tokens: u64,
    pub extra_flags: Vec<String>,
    pub keep_logs: bool,
    pub working_dir: PathBuf,
}

impl From<&TuneConfig> for TrialSettings {
    fn from(config: &TuneConfig) -> Self {
        Self {
            profile: config.profile,
            eval_tokens: config.eval_tokens,
            extra_flags: config.extra_flags.clone(),
            keep_logs: config.keep_logs,
            working_dir: config.repo_root.clone(),
        }
    }
}

pub struct TrialExecutor<L, S> {
    launcher: L,
    logs: S,
    settings: TrialSettings,
    extractor: MetricExtractor,
}

impl<L: JobLauncher, S: LogStore> TrialExecutor<L, S> {
    pub fn new(launcher: L, logs: S, settings: TrialSettings) -> Self {
        Self {
            launcher,
            logs,
            settings,
            extractor: MetricExtractor::default(),
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn logs(&self) -> &S {
        &self.logs
    }

    pub fn settings(&self) -> &TrialSettings {
        &self.settings
    }

    /// The single-process training command for one trial.
    pub fn build_invocation(
        &self,
        params: &ParameterSet,
        iterations: u32,
        trial_id: &str,
    ) -> Invocation {
        let settings = &self.settings;
        let mut invocation = Invocation::new(JOB_PROGRAM)
            .args(["--standalone", "--nproc_per_node=1", "-m", "scripts.base_train", "--"])
            .arg(format!("--depth={MODEL_DEPTH}"))
            .arg(format!("--device_batch_size={}", settings.profile.device_batch_size()))
            .arg(format!("--total_batch_size={TOTAL_BATCH_SIZE}"))
            .arg(format!("--num_iterations={iterations}"))
            .arg(format!("--eval_tokens={}", settings.eval_tokens))
            .args(["--core_metric_every=-1", "--sample_every=-1"])
            .arg(format!("--run={trial_id}"))
            .arg(format!("--model_tag={MODEL_TAG}"))
            .args(["--eve", "True"])
            .arg(format!("--eve_beta1={:.6}", params.beta1()))
            .arg(format!("--eve_beta2={:.6}", params.beta2()))
            .arg(format!("--eve_eta={:.6}", params.eta()))
            .arg(format!("--eve_eps={EVE_EPS}"))
            .args(settings.extra_flags.iter().cloned())
            .current_dir(&settings.working_dir);

        for (key, value) in missing_env_defaults(|key| std::env::var(key).ok()) {
            invocation = invocation.env(key, value);
        }
        invocation
    }

    /// Run one trial to completion.
    ///
    /// Job failures never surface as `Err`; they become a failed
    /// [`TrialOutcome`] with `+inf` metrics. `Err` is reserved for lifecycle
    /// bugs.
    pub async fn run_trial(
        &self,
        params: ParameterSet,
        iterations: u32,
        trial_id: &str,
        stage: Stage,
    ) -> TuneResult<TrialOutcome> {
        let mut trial = Trial::new(trial_id, stage, params, iterations);
        let invocation = self.build_invocation(&params, iterations, trial_id);
        trial.mark_running()?;
        info!(trial_id, %stage, "Launching trial ({params}, iters={iterations})");

        let (text, runtime_secs, exit) = match self.launcher.launch(&invocation).await {
            Ok(output) => (
                output.output,
                output.duration.as_secs_f64(),
                Ok((output.success, output.exit_code)),
            ),
            Err(e) => {
                error!("Trial {trial_id} could not be launched: {e}");
                (e.to_string(), 0.0, Err(e.to_string()))
            }
        };

        let mut log_path = match self.logs.write(trial_id, &text) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Could not persist log for trial {trial_id}: {e}");
                None
            }
        };

        let reading = self.extractor.extract(&text);
        if !reading.is_present() {
            warn!("No validation bpb found in trial {trial_id}; treating as failure.");
        }

        let failure = match exit {
            Err(message) => Some(TrialFailure::LaunchFailed { message }),
            Ok((false, code)) => {
                error!("Trial {trial_id} failed with exit code {code:?}.");
                error!("{text}");
                Some(TrialFailure::NonZeroExit { code, output: text })
            }
            Ok((true, _)) if !reading.is_present() => Some(TrialFailure::MetricMissing),
            Ok((true, _)) => None,
        };

        if !self.settings.keep_logs {
            if let Some(path) = log_path.take() {
                if let Err(e) = self.logs.delete(&path) {
                    warn!("Could not discard log {}: {e}", path.display());
                }
            }
        }

        trial.finish(TrialReport {
            min_metric: reading.min,
            final_metric: reading.last,
            runtime_secs,
            command: invocation.argv(),
            log_path,
            failure,
        })
    }
}
