//! # et-optimizer
//!
//! Search logic for the Eve hyperparameter tuner.
//!
//! Provides the seeded stage-1 candidate generator, ranking of completed
//! trials, perturbation-based stage-2 refinement, the trial lifecycle, and
//! aggregation of outcomes into the persisted run summary.

mod search;
mod summary;
mod trial;

pub use search::{
    generate_initial, sample_initial, seeded_rng, select_top, RefinementPlan, SearchRng,
    INITIAL_BETA1, INITIAL_BETA2, INITIAL_ETA,
};
pub use summary::{best_outcome, BestConfig, RunSummary, TrialRecord};
pub use trial::{Trial, TrialFailure, TrialOutcome, TrialReport, TrialStatus};
