//! Candidate generation, ranking and stage-2 refinement.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use et_types::{Bound, NoiseScale, ParameterSet};

use crate::trial::TrialOutcome;

/// Sampling box for the stage-1 random draws. Narrower than the clamp bounds.
pub const INITIAL_BETA1: Bound = Bound::new(0.85, 0.95);
pub const INITIAL_BETA2: Bound = Bound::new(0.9985, 0.9995);
pub const INITIAL_ETA: Bound = Bound::new(0.8, 1.2);

/// The random stream shared by generation and perturbation.
pub type SearchRng = ChaCha8Rng;

pub fn seeded_rng(seed: u64) -> SearchRng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Draw the stage-1 population from `rng`.
///
/// The first element is always [`ParameterSet::BASELINE`]; the rest are
/// uniform draws from the initial box, three draws per candidate.
pub fn sample_initial<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<ParameterSet> {
    let mut candidates = Vec::with_capacity(n.max(1));
    candidates.push(ParameterSet::BASELINE);
    while candidates.len() < n {
        let beta1 = rng.gen_range(INITIAL_BETA1.low..=INITIAL_BETA1.high);
        let beta2 = rng.gen_range(INITIAL_BETA2.low..=INITIAL_BETA2.high);
        let eta = rng.gen_range(INITIAL_ETA.low..=INITIAL_ETA.high);
        candidates.push(ParameterSet::new(beta1, beta2, eta));
    }
    candidates
}

/// Deterministic stage-1 population for `seed`.
pub fn generate_initial(n: usize, seed: u64) -> Vec<ParameterSet> {
    sample_initial(n, &mut seeded_rng(seed))
}

/// The `k` outcomes with the smallest `min_metric`, ascending.
///
/// The sort is stable, so ties keep their input order, and `+inf` sentinels
/// rank after every finite metric.
pub fn select_top(outcomes: &[TrialOutcome], k: usize) -> Vec<&TrialOutcome> {
    let mut ranked: Vec<&TrialOutcome> = outcomes.iter().collect();
    ranked.sort_by(|a, b| a.min_metric.total_cmp(&b.min_metric));
    ranked.truncate(k);
    ranked
}

/// How stage-1 survivors are expanded into stage-2 candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementPlan {
    /// Whether the unperturbed survivor is re-evaluated.
    pub keep_original: bool,
    /// One perturbed variant per scale, in this order.
    pub scales: Vec<NoiseScale>,
}

impl Default for RefinementPlan {
    fn default() -> Self {
        Self {
            keep_original: true,
            scales: vec![NoiseScale::TIGHT, NoiseScale::LOOSE],
        }
    }
}

impl RefinementPlan {
    pub fn candidates_per_survivor(&self) -> usize {
        self.scales.len() + usize::from(self.keep_original)
    }

    /// Derive stage-2 candidates, survivor by survivor.
    pub fn refine<R: Rng + ?Sized>(
        &self,
        survivors: &[&TrialOutcome],
        rng: &mut R,
    ) -> Vec<ParameterSet> {
        let mut candidates = Vec::with_capacity(survivors.len() * self.candidates_per_survivor());
        for survivor in survivors {
            let base = survivor.parameters;
            if self.keep_original {
                candidates.push(base);
            }
            for scale in &self.scales {
                candidates.push(base.perturb(scale, rng));
            }
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::{Trial, TrialReport};
    use et_types::Stage;

    fn outcome(id: &str, params: ParameterSet, metric: f64) -> TrialOutcome {
        let mut trial = Trial::new(id, Stage::Stage1, params, 100);
        trial.mark_running().unwrap();
        trial
            .finish(TrialReport {
                min_metric: metric,
                final_metric: metric,
                runtime_secs: 1.0,
                command: Vec::new(),
                log_path: None,
                failure: None,
            })
            .unwrap()
    }

    #[test]
    fn initial_population_starts_with_baseline() {
        let candidates = generate_initial(6, 1337);
        assert_eq!(candidates.len(), 6);
        assert_eq!(candidates[0], ParameterSet::BASELINE);
        for p in &candidates[1..] {
            assert!(INITIAL_BETA1.contains(p.beta1()));
            assert!(INITIAL_BETA2.contains(p.beta2()));
            assert!(INITIAL_ETA.contains(p.eta()));
            assert!(p.is_within_bounds());
        }
    }

    #[test]
    fn initial_population_is_deterministic() {
        assert_eq!(generate_initial(8, 42), generate_initial(8, 42));
    }

    #[test]
    fn different_seeds_diverge_after_baseline() {
        let a = generate_initial(5, 1);
        let b = generate_initial(5, 2);
        assert_eq!(a[0], b[0]);
        assert_ne!(a[1..], b[1..]);
    }

    #[test]
    fn tiny_populations_still_hold_the_baseline() {
        assert_eq!(generate_initial(1, 9), vec![ParameterSet::BASELINE]);
        assert_eq!(generate_initial(0, 9), vec![ParameterSet::BASELINE]);
    }

    #[test]
    fn select_top_orders_ascending_with_infinities_last() {
        let outcomes = vec![
            outcome("a", ParameterSet::BASELINE, f64::INFINITY),
            outcome("b", ParameterSet::BASELINE, 2.0),
            outcome("c", ParameterSet::BASELINE, 1.0),
            outcome("d", ParameterSet::BASELINE, 1.5),
        ];
        let top = select_top(&outcomes, 4);
        let ids: Vec<&str> = top.iter().map(|o| o.trial_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d", "b", "a"]);

        let top2 = select_top(&outcomes, 2);
        assert_eq!(top2.len(), 2);
        assert_eq!(top2[0].min_metric, 1.0);
        assert_eq!(top2[1].min_metric, 1.5);
    }

    #[test]
    fn select_top_is_stable_on_ties() {
        let outcomes = vec![
            outcome("first", ParameterSet::BASELINE, 1.0),
            outcome("second", ParameterSet::BASELINE, 1.0),
        ];
        let top = select_top(&outcomes, 1);
        assert_eq!(top[0].trial_id, "first");
    }

    #[test]
    fn select_top_with_large_k_returns_everything() {
        let outcomes = vec![outcome("only", ParameterSet::BASELINE, 3.0)];
        assert_eq!(select_top(&outcomes, 10).len(), 1);
        assert!(select_top(&outcomes, 0).is_empty());
    }

    #[test]
    fn refine_best_of_two() {
        let good = ParameterSet::new(0.88, 0.9988, 0.95);
        let outcomes = vec![
            outcome("worse", ParameterSet::BASELINE, 2.0),
            outcome("better", good, 1.0),
        ];
        let top = select_top(&outcomes, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].min_metric, 1.0);

        let mut rng = seeded_rng(5);
        let plan = RefinementPlan::default();
        let stage2 = plan.refine(&top, &mut rng);
        assert_eq!(stage2.len(), 3);
        assert_eq!(stage2[0], good);

        let tight = NoiseScale::TIGHT;
        assert!((stage2[1].beta1() - good.beta1()).abs() <= tight.beta1 + 1e-12);
        assert!((stage2[1].beta2() - good.beta2()).abs() <= tight.beta2 + 1e-12);
        assert!((stage2[1].eta() - good.eta()).abs() <= tight.eta + 1e-12);

        let loose = NoiseScale::LOOSE;
        assert!((stage2[2].beta1() - good.beta1()).abs() <= loose.beta1 + 1e-12);
        assert!((stage2[2].beta2() - good.beta2()).abs() <= loose.beta2 + 1e-12);
        assert!((stage2[2].eta() - good.eta()).abs() <= loose.eta + 1e-12);
    }

    #[test]
    fn refine_consumes_the_shared_stream_in_order() {
        let outcomes = vec![
            outcome("a", ParameterSet::BASELINE, 1.0),
            outcome("b", ParameterSet::new(0.93, 0.9992, 1.1), 1.2),
        ];
        let top = select_top(&outcomes, 2);
        let plan = RefinementPlan::default();

        let first = plan.refine(&top, &mut seeded_rng(77));
        let second = plan.refine(&top, &mut seeded_rng(77));
        assert_eq!(first, second);
        assert_eq!(first.len(), 6);
        assert_eq!(first[3], outcomes[1].parameters);
    }
}
