//! Deterministic random number generation for reproducible tests.
//!
//! The graph-termination fuzz tests generate random topologies; seeding the
//! generator keeps every failure reproducible from its seed alone.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded generator wrapping `rand::StdRng`.
#[derive(Debug)]
pub struct DeterministicRng {
    rng: StdRng,
    seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Reset to the initial state of the original seed.
    pub fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    pub fn random_u64(&mut self) -> u64 {
        self.rng.random()
    }

    pub fn random_bool(&mut self) -> bool {
        self.rng.random()
    }

    /// Random value in `[min, max)`; returns `min` when the range is empty.
    pub fn random_range(&mut self, min: usize, max: usize) -> usize {
        if min >= max {
            return min;
        }
        min + (self.rng.random::<u64>() as usize) % (max - min)
    }

    /// Choose a random element from a slice, or `None` if it is empty.
    pub fn choose<'a, T>(&mut self, choices: &'a [T]) -> Option<&'a T> {
        if choices.is_empty() {
            None
        } else {
            let idx = self.random_range(0, choices.len());
            Some(&choices[idx])
        }
    }
}
