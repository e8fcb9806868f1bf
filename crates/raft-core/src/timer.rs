//! # timer
//!
//! why: randomized election timeouts keep split votes rare
//! relations: owned by node.rs, advanced by RaftNode::tick
//! what: ElectionTimer counting logical ticks against a random deadline

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Logical election timer
///
/// The node never reads a clock; the caller calls `tick` at a fixed rate.
#[derive(Debug)]
pub struct ElectionTimer {
    min: u64,
    max: u64,
    elapsed: u64,
    timeout: u64,
    rng: StdRng,
}

impl ElectionTimer {
    /// Timer with a timeout drawn from `[min, max]`, seeded from entropy
    pub fn new(min: u64, max: u64) -> Self {
        Self::with_rng(min, max, StdRng::from_entropy())
    }

    /// Timer with a deterministic random sequence
    pub fn seeded(min: u64, max: u64, seed: u64) -> Self {
        Self::with_rng(min, max, StdRng::seed_from_u64(seed))
    }

    fn with_rng(min: u64, max: u64, rng: StdRng) -> Self {
        let mut timer = Self {
            min,
            max: max.max(min),
            elapsed: 0,
            timeout: min,
            rng,
        };
        timer.reset();
        timer
    }

    /// Restart the countdown with a fresh random timeout
    pub fn reset(&mut self) {
        self.elapsed = 0;
        self.timeout = self.rng.gen_range(self.min..=self.max);
    }

    /// Advance one tick; returns true once the timeout has been reached
    pub fn tick(&mut self) -> bool {
        self.elapsed = self.elapsed.saturating_add(1);
        self.expired()
    }

    pub fn expired(&self) -> bool {
        self.elapsed >= self.timeout
    }

    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }
}
