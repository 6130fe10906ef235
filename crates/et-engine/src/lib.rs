//! # et-engine
//!
//! Runs the two-stage Eve search against an external training job.
//!
//! Stage 1 evaluates the seeded random population; the best survivors are
//! perturbed into a stage-2 population that runs with a larger iteration
//! budget; every outcome is folded into a [`RunSummary`]. Trials run one at a
//! time, in order, and the random stream is consumed in the same order on
//! every run with the same seed.

pub mod bootstrap;
pub mod config;
pub mod executor;
pub mod launcher;
pub mod logs;
pub mod metrics;

pub use bootstrap::DatasetBootstrap;
pub use config::TuneConfig;
pub use executor::{TrialExecutor, TrialSettings};
pub use launcher::{Invocation, JobLauncher, LaunchOutput, ProcessLauncher, ScriptedLauncher};
pub use logs::{FileLogStore, LogStore, MemoryLogStore};
pub use metrics::{MetricExtractor, MetricReading};

use et_optimizer::{sample_initial, seeded_rng, select_top, RunSummary, SearchRng, TrialOutcome};
use et_types::{ParameterSet, Stage, TuneResult};
use tracing::info;

/// Two-stage search driver.
pub struct Autotuner<L, S> {
    config: TuneConfig,
    executor: TrialExecutor<L, S>,
    rng: SearchRng,
    outcomes: Vec<TrialOutcome>,
}

impl<L: JobLauncher, S: LogStore> Autotuner<L, S> {
    pub fn new(config: TuneConfig, launcher: L, logs: S) -> TuneResult<Self> {
        config.validate()?;
        let executor = TrialExecutor::new(launcher, logs, TrialSettings::from(&config));
        let rng = seeded_rng(config.seed);
        Ok(Self {
            config,
            executor,
            rng,
            outcomes: Vec::new(),
        })
    }

    pub fn config(&self) -> &TuneConfig {
        &self.config
    }

    pub fn executor(&self) -> &TrialExecutor<L, S> {
        &self.executor
    }

    /// Every outcome so far, in execution order.
    pub fn outcomes(&self) -> &[TrialOutcome] {
        &self.outcomes
    }

    /// Run both stages and aggregate.
    ///
    /// Returns [`et_types::TuneError::AllTrialsFailed`] when no trial produced
    /// a finite metric.
    pub async fn run(&mut self) -> TuneResult<RunSummary> {
        let stage1 = sample_initial(self.config.stage1_trials, &mut self.rng);
        info!("Stage 1: evaluating {} random candidates...", stage1.len());
        self.run_stage(Stage::Stage1, &stage1, self.config.stage1_iters)
            .await?;

        let k = self.config.top_k.min(self.outcomes.len());
        let survivors = select_top(&self.outcomes, k);
        info!("Stage 1 best candidates:");
        for survivor in &survivors {
            info!("  {survivor}");
        }
        let stage2 = self.config.refinement.refine(&survivors, &mut self.rng);

        info!(
            "Stage 2: refining {} candidates with {} iterations each...",
            stage2.len(),
            self.config.stage2_iters
        );
        self.run_stage(Stage::Stage2, &stage2, self.config.stage2_iters)
            .await?;

        RunSummary::aggregate(&self.outcomes, self.config.profile, self.config.seed)
    }

    /// [`Autotuner::run`], then write the summary to the configured path.
    ///
    /// Nothing is written when every trial failed.
    pub async fn run_and_persist(&mut self) -> TuneResult<RunSummary> {
        let summary = self.run().await?;
        summary.persist(&self.config.summary_path())?;
        Ok(summary)
    }

    async fn run_stage(
        &mut self,
        stage: Stage,
        candidates: &[ParameterSet],
        iterations: u32,
    ) -> TuneResult<()> {
        for (idx, params) in candidates.iter().enumerate() {
            let trial_id = stage.trial_id(idx + 1);
            let outcome = self
                .executor
                .run_trial(*params, iterations, &trial_id, stage)
                .await?;
            info!("  {outcome}");
            self.outcomes.push(outcome);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use et_optimizer::generate_initial;

    #[tokio::test]
    async fn trial_counts_and_ids_follow_the_stages() {
        let config = TuneConfig::default()
            .with_stage1(3, 10)
            .with_stage2_iters(20)
            .with_top_k(2);
        let launcher = ScriptedLauncher::always(0, "Validation bpb: 1.0\n");
        let mut tuner = Autotuner::new(config, launcher, MemoryLogStore::new()).unwrap();
        tuner.run().await.unwrap();

        let ids: Vec<&str> = tuner
            .outcomes()
            .iter()
            .map(|o| o.trial_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec![
                "autotune_stage1_1",
                "autotune_stage1_2",
                "autotune_stage1_3",
                "autotune_stage2_1",
                "autotune_stage2_2",
                "autotune_stage2_3",
                "autotune_stage2_4",
                "autotune_stage2_5",
                "autotune_stage2_6",
            ]
        );
        assert!(tuner.outcomes()[..3].iter().all(|o| o.iterations == 10));
        assert!(tuner.outcomes()[3..].iter().all(|o| o.iterations == 20));
    }

    #[tokio::test]
    async fn stage1_uses_the_seeded_population() {
        let config = TuneConfig::default()
            .with_stage1(4, 10)
            .with_stage2_iters(20)
            .with_seed(99);
        let launcher = ScriptedLauncher::always(0, "Validation bpb: 1.0\n");
        let mut tuner = Autotuner::new(config, launcher, MemoryLogStore::new()).unwrap();
        tuner.run().await.unwrap();

        let stage1: Vec<ParameterSet> =
            tuner.outcomes()[..4].iter().map(|o| o.parameters).collect();
        assert_eq!(stage1, generate_initial(4, 99));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = TuneConfig::default().with_stage1(2, 100).with_stage2_iters(50);
        let tuner = Autotuner::new(config, ScriptedLauncher::new(), MemoryLogStore::new());
        assert!(tuner.is_err());
    }
}
