//! Deterministic random stream shared by every synthesis stage.
//!
//! Each stage draws from its own ChaCha stream derived from the case seed, so
//! the number of values one stage consumes never shifts the values seen by
//! another. No OS or thread-local entropy is used anywhere in synthesis.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

/// Independent sub-streams, one per consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Rhythm = 1,
    Ectopy = 2,
    Escape = 3,
    Morphology = 4,
    Artifacts = 5,
}

/// Seeded uniform/normal source.
///
/// Identical `(seed, stream)` pairs yield bit-identical sequences; `reset`
/// restarts from the first value.
#[derive(Debug, Clone)]
pub struct SeededRng {
    seed: u32,
    stream: u64,
    rng: ChaCha8Rng,
    spare_normal: Option<f64>,
}

impl SeededRng {
    pub fn new(seed: u32) -> Self {
        Self::with_stream(seed, 0)
    }

    pub fn for_stage(seed: u32, stream: Stream) -> Self {
        Self::with_stream(seed, stream as u64)
    }

    fn with_stream(seed: u32, stream: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(u64::from(seed));
        rng.set_stream(stream);
        Self {
            seed,
            stream,
            rng,
            spare_normal: None,
        }
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Restart the sequence from its first value.
    pub fn reset(&mut self) {
        *self = Self::with_stream(self.seed, self.stream);
    }

    /// Uniform deviate in [0, 1).
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Uniform deviate in [lo, hi).
    pub fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.uniform()
    }

    /// Standard-normal deviate (Box–Muller, second deviate cached).
    pub fn normal(&mut self) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return z;
        }
        // 1 - u keeps the log argument in (0, 1].
        let u1 = 1.0 - self.uniform();
        let u2 = self.uniform();
        let radius = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;
        self.spare_normal = Some(radius * theta.sin());
        radius * theta.cos()
    }

    /// Bernoulli trial with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.uniform() < p
    }
}
