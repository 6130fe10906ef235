//! Trial lifecycle and the immutable outcome record each trial produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use et_types::{ParameterSet, Stage, TrialError, TuneResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TrialStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// `Pending -> Running -> {Succeeded, Failed}`; nothing else.
    pub fn can_transition_to(&self, next: TrialStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Why a trial ended in [`TrialStatus::Failed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialFailure {
    /// The job exited unsuccessfully. `output` is the full captured text.
    NonZeroExit { code: Option<i32>, output: String },
    /// The job could not be started or its output could not be read.
    LaunchFailed { message: String },
    /// The job exited cleanly but never reported a validation metric.
    MetricMissing,
}

impl std::fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonZeroExit { code: Some(code), .. } => write!(f, "exit code {code}"),
            Self::NonZeroExit { code: None, .. } => write!(f, "terminated by signal"),
            Self::LaunchFailed { message } => write!(f, "launch failed: {message}"),
            Self::MetricMissing => write!(f, "no validation metric reported"),
        }
    }
}

/// What the executor observed while a trial was running.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReport {
    pub min_metric: f64,
    pub final_metric: f64,
    pub runtime_secs: f64,
    pub command: Vec<String>,
    pub log_path: Option<PathBuf>,
    pub failure: Option<TrialFailure>,
}

/// A single trial (one parameter set evaluated by one training run).
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    pub id: String,
    pub stage: Stage,
    pub parameters: ParameterSet,
    pub iterations: u32,
    pub status: TrialStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl Trial {
    pub fn new(
        id: impl Into<String>,
        stage: Stage,
        parameters: ParameterSet,
        iterations: u32,
    ) -> Self {
        Self {
            id: id.into(),
            stage,
            parameters,
            iterations,
            status: TrialStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
        }
    }

    fn transition(&mut self, next: TrialStatus) -> TuneResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TrialError::InvalidTransition {
                trial_id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_running(&mut self) -> TuneResult<()> {
        self.transition(TrialStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Close the trial and freeze it into a [`TrialOutcome`].
    ///
    /// A report carrying a failure, or lacking a finite minimum, ends the
    /// trial as failed with both metrics forced to `+inf`.
    pub fn finish(mut self, report: TrialReport) -> TuneResult<TrialOutcome> {
        let failed = report.failure.is_some() || !report.min_metric.is_finite();
        let next = if failed {
            TrialStatus::Failed
        } else {
            TrialStatus::Succeeded
        };
        self.transition(next)?;

        let (min_metric, final_metric) = if failed {
            (f64::INFINITY, f64::INFINITY)
        } else {
            (report.min_metric, report.final_metric)
        };
        let failure = match report.failure {
            Some(failure) => Some(failure),
            None if failed => Some(TrialFailure::MetricMissing),
            None => None,
        };

        Ok(TrialOutcome {
            stage: self.stage,
            trial_id: self.id,
            parameters: self.parameters,
            iterations: self.iterations,
            min_metric,
            final_metric,
            runtime_secs: report.runtime_secs,
            command: report.command,
            log_path: report.log_path,
            status: self.status,
            failure,
            started_at: self.started_at.unwrap_or(self.created_at),
        })
    }
}

/// Result of a single trial. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    pub stage: Stage,
    pub trial_id: String,
    pub parameters: ParameterSet,
    pub iterations: u32,
    /// Lowest validation metric seen, `+inf` when the trial failed.
    pub min_metric: f64,
    /// Last validation metric seen, `+inf` when the trial failed.
    pub final_metric: f64,
    pub runtime_secs: f64,
    pub command: Vec<String>,
    pub log_path: Option<PathBuf>,
    pub status: TrialStatus,
    pub failure: Option<TrialFailure>,
    pub started_at: DateTime<Utc>,
}

impl TrialOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TrialStatus::Succeeded && self.min_metric.is_finite()
    }

    pub fn runtime_minutes(&self) -> f64 {
        self.runtime_secs / 60.0
    }
}

impl std::fmt::Display for TrialOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}: min_bpb={:.4}, {}, iters={}, runtime={:.1}m",
            self.stage,
            self.trial_id,
            self.min_metric,
            self.parameters,
            self.iterations,
            self.runtime_minutes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(min: f64, last: f64, failure: Option<TrialFailure>) -> TrialReport {
        TrialReport {
            min_metric: min,
            final_metric: last,
            runtime_secs: 90.0,
            command: vec!["torchrun".into()],
            log_path: None,
            failure,
        }
    }

    #[test]
    fn trial_lifecycle() {
        let mut trial =
            Trial::new("autotune_stage1_1", Stage::Stage1, ParameterSet::BASELINE, 2500);
        assert_eq!(trial.status, TrialStatus::Pending);
        assert!(trial.started_at.is_none());

        trial.mark_running().unwrap();
        assert_eq!(trial.status, TrialStatus::Running);
        assert!(trial.started_at.is_some());

        let outcome = trial.finish(report(1.1, 1.2, None)).unwrap();
        assert_eq!(outcome.status, TrialStatus::Succeeded);
        assert_eq!(outcome.min_metric, 1.1);
        assert_eq!(outcome.final_metric, 1.2);
        assert!(outcome.is_success());
        assert_eq!(outcome.runtime_minutes(), 1.5);
    }

    #[test]
    fn nonzero_exit_discards_parsed_metrics() {
        let mut trial = Trial::new("t", Stage::Stage2, ParameterSet::BASELINE, 5000);
        trial.mark_running().unwrap();
        let failure = TrialFailure::NonZeroExit {
            code: Some(2),
            output: "Validation bpb: 0.9\nboom".into(),
        };
        let outcome = trial.finish(report(0.9, 0.9, Some(failure))).unwrap();
        assert_eq!(outcome.status, TrialStatus::Failed);
        assert!(outcome.min_metric.is_infinite());
        assert!(outcome.final_metric.is_infinite());
        assert!(!outcome.is_success());
    }

    #[test]
    fn missing_metric_marks_failed() {
        let mut trial = Trial::new("t", Stage::Stage1, ParameterSet::BASELINE, 10);
        trial.mark_running().unwrap();
        let outcome = trial
            .finish(report(f64::INFINITY, f64::INFINITY, None))
            .unwrap();
        assert_eq!(outcome.status, TrialStatus::Failed);
        assert_eq!(outcome.failure, Some(TrialFailure::MetricMissing));
    }

    #[test]
    fn finishing_a_pending_trial_is_rejected() {
        let trial = Trial::new("t", Stage::Stage1, ParameterSet::BASELINE, 10);
        let err = trial.finish(report(1.0, 1.0, None)).unwrap_err();
        assert!(err.to_string().contains("PENDING -> SUCCEEDED"));
    }

    #[test]
    fn running_twice_is_rejected() {
        let mut trial = Trial::new("t", Stage::Stage1, ParameterSet::BASELINE, 10);
        trial.mark_running().unwrap();
        assert!(trial.mark_running().is_err());
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [TrialStatus::Succeeded, TrialStatus::Failed] {
            assert!(terminal.is_terminal());
            for next in [
                TrialStatus::Pending,
                TrialStatus::Running,
                TrialStatus::Succeeded,
                TrialStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn outcome_display_matches_progress_format() {
        let mut trial =
            Trial::new("autotune_stage1_2", Stage::Stage1, ParameterSet::BASELINE, 2500);
        trial.mark_running().unwrap();
        let outcome = trial.finish(report(1.23456, 1.3, None)).unwrap();
        assert_eq!(
            outcome.to_string(),
            "[stage1] autotune_stage1_2: min_bpb=1.2346, beta1=0.9000, beta2=0.999000, eta=1.000, iters=2500, runtime=1.5m"
        );
    }
}
