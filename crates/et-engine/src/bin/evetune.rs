//! evetune CLI
//!
//! Quick two-stage Eve hyperparameter search over short training runs.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

use et_engine::{Autotuner, DatasetBootstrap, FileLogStore, ProcessLauncher, TuneConfig};
use et_types::{Profile, TuneError};

#[derive(Parser, Debug)]
#[command(name = "evetune")]
#[command(version, about = "Quick Eve hyperparameter tuner", long_about = None)]
struct Cli {
    /// Hardware preset (h100, rtx5090)
    #[arg(long, default_value = "h100")]
    profile: Profile,

    /// Number of stage-1 candidates, baseline included
    #[arg(long, default_value_t = 4)]
    stage1_trials: usize,

    /// Iterations per stage-1 trial
    #[arg(long, default_value_t = 2500)]
    stage1_iters: u32,

    /// Iterations per stage-2 trial
    #[arg(long, default_value_t = 5000)]
    stage2_iters: u32,

    #[arg(long, default_value_t = 1337)]
    seed: u64,

    /// Keep per-trial logs in autotune_logs/
    #[arg(long)]
    keep_logs: bool,

    #[arg(long, default_value_t = 16_384)]
    eval_tokens: u64,

    /// Additional flag to pass through to base_train (repeatable)
    #[arg(long = "extra-flag", allow_hyphen_values = true)]
    extra_flags: Vec<String>,

    /// Repository root the training job runs in
    #[arg(long, env = "EVETUNE_REPO_ROOT", default_value = ".")]
    repo_root: PathBuf,

    /// Stage-1 survivors refined in stage 2
    #[arg(long, default_value_t = 2)]
    top_k: usize,

    /// Skip the dataset check
    #[arg(long)]
    skip_bootstrap: bool,

    /// Dataset shards required before tuning starts
    #[arg(long, default_value_t = 16)]
    min_shards: usize,
}

impl Cli {
    fn into_config(self) -> TuneConfig {
        TuneConfig::default()
            .with_profile(self.profile)
            .with_stage1(self.stage1_trials, self.stage1_iters)
            .with_stage2_iters(self.stage2_iters)
            .with_seed(self.seed)
            .with_keep_logs(self.keep_logs)
            .with_eval_tokens(self.eval_tokens)
            .with_extra_flags(self.extra_flags)
            .with_top_k(self.top_k)
            .with_repo_root(self.repo_root)
            .with_bootstrap(self.skip_bootstrap, self.min_shards)
    }
}

/// `RUST_LOG` directives when set and valid, `info` otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .init();

    let config = Cli::parse().into_config();
    config.validate()?;

    let launcher = ProcessLauncher::new();
    if !config.skip_bootstrap {
        DatasetBootstrap::new(&config.repo_root, config.min_shards)
            .ensure(&launcher)
            .await
            .context("dataset bootstrap failed")?;
    }

    let logs = FileLogStore::new(config.log_dir())?;
    let mut tuner = Autotuner::new(config.clone(), launcher, logs)?;
    let summary = match tuner.run_and_persist().await {
        Ok(summary) => summary,
        Err(e @ TuneError::AllTrialsFailed { .. }) => {
            error!(
                "All trials failed; please inspect logs in {}/.",
                config.log_dir().display()
            );
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    let best = &summary.best;
    println!();
    println!("Recommended Eve settings:");
    println!("  beta1 = {:.4}", best.beta1);
    println!("  beta2 = {:.6}", best.beta2);
    println!("  eta   = {:.3}", best.eta);
    println!(
        "  min bpb observed = {:.4} ({}, {} iters)",
        best.min_metric, best.stage, best.iterations
    );
    println!("  summary written to {}", config.summary_path().display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let config = Cli::parse_from(["evetune"]).into_config();
        assert_eq!(config, TuneConfig::default());
    }

    #[test]
    fn extra_flags_are_repeatable_and_verbatim() {
        let cli = Cli::parse_from([
            "evetune",
            "--profile",
            "rtx5090",
            "--extra-flag",
            "--window_pattern=L",
            "--extra-flag=--matrix_lr=0.02",
            "--keep-logs",
        ]);
        assert_eq!(cli.profile, Profile::Rtx5090);
        assert!(cli.keep_logs);
        assert_eq!(cli.extra_flags, vec!["--window_pattern=L", "--matrix_lr=0.02"]);
    }

    #[test]
    fn log_filter_honours_bare_levels() {
        use tracing_subscriber::filter::LevelFilter;

        assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("  ")).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(log_filter(Some("debug")).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            log_filter(Some("evetune::job=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }

    #[test]
    fn unknown_profile_is_rejected() {
        assert!(Cli::try_parse_from(["evetune", "--profile", "a100"]).is_err());
    }
}
