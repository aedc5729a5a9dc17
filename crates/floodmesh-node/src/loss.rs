//! Stochastic source-link loss
//!
//! Models a failed sensing/transmission attempt at the seed: each origination
//! cycle runs one Bernoulli trial and skips the cycle on a hit. Relays are
//! never subjected to it.

use rand::Rng;

/// Per-cycle drop decision with a fixed probability
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossSimulator {
    probability: f64,
}

impl LossSimulator {
    /// Create a simulator dropping with `probability`, clamped to [0, 1]
    pub fn new(probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { probability }
    }

    /// A simulator that never drops
    pub fn disabled() -> Self {
        Self { probability: 0.0 }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    /// Run one independent trial
    pub fn should_drop(&self) -> bool {
        if self.probability <= 0.0 {
            false
        } else if self.probability >= 1.0 {
            true
        } else {
            rand::rng().random_bool(self.probability)
        }
    }
}
