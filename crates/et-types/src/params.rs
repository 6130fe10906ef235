//! The three-parameter Eve optimizer configuration and its bounded space.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Closed interval `[low, high]` for one parameter dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub low: f64,
    pub high: f64,
}

impl Bound {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Project `value` into the interval. NaN lands on `low`.
    pub fn project(&self, value: f64) -> f64 {
        value.max(self.low).min(self.high)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

pub const BETA1_BOUND: Bound = Bound::new(0.80, 0.98);
pub const BETA2_BOUND: Bound = Bound::new(0.996, 0.9999);
pub const ETA_BOUND: Bound = Bound::new(0.5, 1.5);

/// Per-dimension half-widths for uniform perturbation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseScale {
    pub beta1: f64,
    pub beta2: f64,
    pub eta: f64,
}

impl NoiseScale {
    pub const fn new(beta1: f64, beta2: f64, eta: f64) -> Self {
        Self { beta1, beta2, eta }
    }

    /// Tighter scale used for the first stage-2 refinement.
    pub const TIGHT: NoiseScale = NoiseScale::new(0.01, 2.5e-4, 0.08);

    /// Looser scale used for the second stage-2 refinement.
    pub const LOOSE: NoiseScale = NoiseScale::new(0.015, 3e-4, 0.1);
}

impl Default for NoiseScale {
    fn default() -> Self {
        Self::new(0.02, 3e-4, 0.1)
    }
}

#[derive(Deserialize)]
struct RawParameterSet {
    beta1: f64,
    beta2: f64,
    eta: f64,
}

impl From<RawParameterSet> for ParameterSet {
    fn from(raw: RawParameterSet) -> Self {
        ParameterSet::from_raw(raw.beta1, raw.beta2, raw.eta).clamp()
    }
}

/// One candidate Eve configuration.
///
/// Values handed out by [`ParameterSet::new`], [`ParameterSet::perturb`] and
/// deserialization are always inside the bounds. [`ParameterSet::from_raw`]
/// is the only way to hold an unprojected point, and it is meant to be fed
/// straight into [`ParameterSet::clamp`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawParameterSet")]
pub struct ParameterSet {
    beta1: f64,
    beta2: f64,
    eta: f64,
}

impl ParameterSet {
    /// Baseline configuration evaluated first in every search.
    pub const BASELINE: ParameterSet = ParameterSet {
        beta1: 0.90,
        beta2: 0.9990,
        eta: 1.00,
    };

    /// Build a clamped parameter set.
    pub fn new(beta1: f64, beta2: f64, eta: f64) -> Self {
        Self::from_raw(beta1, beta2, eta).clamp()
    }

    /// Build a parameter set without projecting it into bounds.
    pub fn from_raw(beta1: f64, beta2: f64, eta: f64) -> Self {
        Self { beta1, beta2, eta }
    }

    pub fn beta1(&self) -> f64 {
        self.beta1
    }

    pub fn beta2(&self) -> f64 {
        self.beta2
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    /// Project each field independently into its closed bound.
    pub fn clamp(self) -> Self {
        Self {
            beta1: BETA1_BOUND.project(self.beta1),
            beta2: BETA2_BOUND.project(self.beta2),
            eta: ETA_BOUND.project(self.eta),
        }
    }

    /// Add an independent uniform offset in `[-σ, σ]` to each field, then clamp.
    ///
    /// Exactly three draws are taken from `rng`, in `beta1`, `beta2`, `eta`
    /// order, whatever the noise scale.
    pub fn perturb<R: Rng + ?Sized>(&self, noise: &NoiseScale, rng: &mut R) -> Self {
        Self {
            beta1: self.beta1 + uniform_offset(noise.beta1, rng),
            beta2: self.beta2 + uniform_offset(noise.beta2, rng),
            eta: self.eta + uniform_offset(noise.eta, rng),
        }
        .clamp()
    }

    pub fn is_within_bounds(&self) -> bool {
        BETA1_BOUND.contains(self.beta1)
            && BETA2_BOUND.contains(self.beta2)
            && ETA_BOUND.contains(self.eta)
    }
}

fn uniform_offset<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> f64 {
    let unit: f64 = rng.gen_range(-1.0..=1.0);
    unit * sigma.abs()
}

impl std::fmt::Display for ParameterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "beta1={:.4}, beta2={:.6}, eta={:.3}",
            self.beta1, self.beta2, self.eta
        )
    }
}
