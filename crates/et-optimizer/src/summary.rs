//! Aggregation of trial outcomes into the persisted run summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use et_types::{Profile, Stage, TuneError, TuneResult};

use crate::trial::TrialOutcome;

/// The winning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestConfig {
    pub trial_id: String,
    pub beta1: f64,
    pub beta2: f64,
    pub eta: f64,
    #[serde(rename = "min_bpb")]
    pub min_metric: f64,
    pub stage: Stage,
    pub iterations: u32,
}

/// One successful trial as it appears in the summary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub stage: Stage,
    pub trial_id: String,
    pub beta1: f64,
    pub beta2: f64,
    pub eta: f64,
    #[serde(rename = "min_bpb")]
    pub min_metric: f64,
    #[serde(rename = "final_bpb")]
    pub final_metric: f64,
    pub iterations: u32,
    pub runtime_minutes: f64,
    pub log_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
}

impl From<&TrialOutcome> for TrialRecord {
    fn from(outcome: &TrialOutcome) -> Self {
        Self {
            stage: outcome.stage,
            trial_id: outcome.trial_id.clone(),
            beta1: outcome.parameters.beta1(),
            beta2: outcome.parameters.beta2(),
            eta: outcome.parameters.eta(),
            min_metric: outcome.min_metric,
            final_metric: outcome.final_metric,
            iterations: outcome.iterations,
            runtime_minutes: outcome.runtime_minutes(),
            log_path: outcome.log_path.clone(),
            started_at: outcome.started_at,
        }
    }
}

/// Terminal artifact of a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub profile: Profile,
    pub seed: u64,
    pub best: BestConfig,
    /// Every trial with a finite metric, in execution order.
    pub trials: Vec<TrialRecord>,
}

/// First outcome holding the smallest finite `min_metric`.
pub fn best_outcome(outcomes: &[TrialOutcome]) -> Option<&TrialOutcome> {
    let mut best: Option<&TrialOutcome> = None;
    for outcome in outcomes.iter().filter(|o| o.is_success()) {
        let improves = match best {
            None => true,
            Some(current) => outcome.min_metric < current.min_metric,
        };
        if improves {
            best = Some(outcome);
        }
    }
    best
}

impl RunSummary {
    /// Build the summary from every outcome of the run.
    ///
    /// Fails with [`TuneError::AllTrialsFailed`] when no outcome is finite.
    pub fn aggregate(outcomes: &[TrialOutcome], profile: Profile, seed: u64) -> TuneResult<Self> {
        let best = best_outcome(outcomes).ok_or(TuneError::AllTrialsFailed {
            attempted: outcomes.len(),
        })?;

        let trials: Vec<TrialRecord> = outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(TrialRecord::from)
            .collect();

        Ok(Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            profile,
            seed,
            best: BestConfig {
                trial_id: best.trial_id.clone(),
                beta1: best.parameters.beta1(),
                beta2: best.parameters.beta2(),
                eta: best.parameters.eta(),
                min_metric: best.min_metric,
                stage: best.stage,
                iterations: best.iterations,
            },
            trials,
        })
    }

    /// Write the summary as pretty JSON, replacing any previous file.
    pub fn persist(&self, path: &Path) -> TuneResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Run summary written to {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> TuneResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
