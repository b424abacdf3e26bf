//! Probability gates for stochastic lore inclusion.
//!
//! Each triggered entry is gated exactly once per turn. The gate is passed in
//! by the caller so tests (and replayable turns) can pin the outcome.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Decides whether an entry with the given inclusion chance survives.
pub trait ProbabilityGate {
    /// `probability` is a percentage in `0..=100`.
    fn admits(&mut self, probability: u8) -> bool;
}

/// Seeded RNG gate. Identical seeds give identical decisions.
///
/// 100% and 0% are decided without drawing, so certain entries do not shift
/// the random sequence seen by uncertain ones.
pub struct SeededGate {
    rng: StdRng,
}

impl SeededGate {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A gate seeded from the thread-local entropy source.
    pub fn from_entropy() -> Self {
        Self::new(rand::rng().random())
    }
}

impl ProbabilityGate for SeededGate {
    fn admits(&mut self, probability: u8) -> bool {
        match probability {
            0 => false,
            p if p >= 100 => true,
            p => self.rng.random_range(0..100u8) < p,
        }
    }
}

/// Every entry passes, whatever its probability.
pub struct AlwaysTrigger;

impl ProbabilityGate for AlwaysTrigger {
    fn admits(&mut self, _probability: u8) -> bool {
        true
    }
}

/// No entry passes, whatever its probability.
pub struct NeverTrigger;

impl ProbabilityGate for NeverTrigger {
    fn admits(&mut self, _probability: u8) -> bool {
        false
    }
}
