use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Randomness for scheduling decisions. Seedable so scheduler behavior
/// replays exactly in tests.
pub struct CycleSampler {
    rng: StdRng,
}

impl CycleSampler {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Uniform draw over the configured interval range, both ends
    /// included.
    pub fn draw_interval(&mut self, min_seconds: u64, max_seconds: u64) -> u64 {
        self.rng.gen_range(min_seconds..=max_seconds)
    }

    /// Balance fraction for randomized trade amounts: two independent
    /// uniform draws blended as `w * u1 + (1 - w) * u2`.
    pub fn draw_fraction(&mut self, blend_weight: f64) -> f64 {
        let first = self.rng.gen::<f64>();
        let second = self.rng.gen::<f64>();
        (blend_weight * first + (1.0 - blend_weight) * second).clamp(0.0, 1.0)
    }

    /// Coin flip deciding whether the pair direction reverses after a
    /// cycle.
    pub fn draw_flip(&mut self) -> bool {
        self.rng.gen_bool(0.5)
    }
}
