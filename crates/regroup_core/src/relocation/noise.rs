//! Sort-key perturbation for concurrent appends.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default upper bound of the perturbation.
///
/// Adjacent integral sort keys are at least `1.0` apart, so this never flips
/// the order of items more than one position away.
pub const DEFAULT_NOISE_EPSILON: f64 = 1e-6;

/// Source of small positive sort-key offsets.
#[derive(Debug, Clone)]
pub struct SortNoise {
    epsilon: f64,
    rng: StdRng,
}

impl SortNoise {
    /// Creates an entropy-seeded generator bounded by `epsilon`.
    ///
    /// Non-finite or non-positive bounds fall back to `DEFAULT_NOISE_EPSILON`.
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon: sanitize_epsilon(epsilon),
            rng: StdRng::from_entropy(),
        }
    }

    /// Creates a reproducible generator.
    pub fn seeded(epsilon: f64, seed: u64) -> Self {
        Self {
            epsilon: sanitize_epsilon(epsilon),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Returns a value in `(0, epsilon)`.
    pub fn sample(&mut self) -> f64 {
        let value = self.rng.gen_range(0.0..self.epsilon);
        if value > 0.0 {
            value
        } else {
            self.epsilon / 2.0
        }
    }
}

impl Default for SortNoise {
    fn default() -> Self {
        Self::new(DEFAULT_NOISE_EPSILON)
    }
}

fn sanitize_epsilon(epsilon: f64) -> f64 {
    if epsilon.is_finite() && epsilon > 0.0 && epsilon < 1.0 {
        epsilon
    } else {
        DEFAULT_NOISE_EPSILON
    }
}
