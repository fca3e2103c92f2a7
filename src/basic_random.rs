//! RND and RANDOMIZE.
//!
//! Until a program seeds it, RND follows one fixed sequence so every run of a
//! fresh machine behaves the same. `RANDOMIZE n` switches to the console's
//! 16-bit congruential generator seeded with `n`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seed of the sequence a fresh machine starts with.
const DEFAULT_SEED: u64 = 0x3567;

const LCG_MULTIPLIER: u32 = 0x6FE5;
const LCG_INCREMENT: u32 = 0x7AB9;

/// Digits drawn per RND value; each contributes two decimal places.
const RND_DIGITS: usize = 7;

/// Where RANDOMIZE without a value gets its seed.
pub trait SeedSource {
    fn seed(&mut self) -> u16;
}

/// Seeds from the thread-local generator.
#[derive(Debug, Default)]
pub struct ThreadSeedSource;

impl SeedSource for ThreadSeedSource {
    fn seed(&mut self) -> u16 {
        rand::thread_rng().gen()
    }
}

/// Always hands out the same seed. Used by tests.
#[derive(Debug)]
pub struct FixedSeed(pub u16);

impl SeedSource for FixedSeed {
    fn seed(&mut self) -> u16 {
        self.0
    }
}

#[derive(Debug, Clone)]
enum Generator {
    Default(StdRng),
    Congruential(u32),
}

#[derive(Debug, Clone)]
pub struct RandomGenerator {
    generator: Generator,
}

impl RandomGenerator {
    pub fn new() -> Self {
        RandomGenerator {
            generator: Generator::Default(StdRng::seed_from_u64(DEFAULT_SEED)),
        }
    }

    /// Back to the fixed default sequence.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn reseed(&mut self, seed: u16) {
        tracing::debug!(seed, "reseeding random generator");
        self.generator = Generator::Congruential(seed as u32);
    }

    /// A value in `0..divisor`; a divisor of 0 counts as 1.
    pub fn next_below(&mut self, divisor: u32) -> u32 {
        let divisor = divisor.max(1);
        match &mut self.generator {
            Generator::Default(rng) => rng.gen_range(0..divisor),
            Generator::Congruential(state) => {
                *state = ((*state * LCG_MULTIPLIER) & 0xFFFF) + LCG_INCREMENT;
                let value = ((*state & 0xFFFF) as u16).swap_bytes() as u32;
                value % divisor
            }
        }
    }

    /// Next RND value in [0, 1), built from base-100 digits.
    pub fn next_fraction(&mut self) -> f64 {
        let mut value = 0.0;
        let mut scale = 1.0;
        for _ in 0..RND_DIGITS {
            scale /= 100.0;
            value += self.next_below(100) as f64 * scale;
        }
        value
    }
}

impl Default for RandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}
