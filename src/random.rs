//! Injectable randomness
//!
//! Routing decisions and reply selection draw from a [`RandomSource`] so that
//! tests can script exact values and production runs can be seeded.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};

pub trait RandomSource: Send + Sync {
    /// Uniform value in `[0, 1)`
    fn next_f64(&self) -> f64;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn below(&self, len: usize) -> usize;
}

/// `StdRng` behind a mutex
pub struct StdRandom {
    rng: Mutex<StdRng>,
}

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&self) -> f64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen::<f64>()
    }

    fn below(&self, len: usize) -> usize {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..len)
    }
}
