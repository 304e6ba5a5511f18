//! Ectopic-beat state machine.

use log::trace;

use crate::synth::params::{EctopyConfig, EctopyKind};
use crate::synth::random::{SeededRng, Stream};

/// Decides, beat by beat, whether the next beat is premature.
///
/// Advanced once per prospective beat by a single owner. Index 0 is never
/// ectopic and two ectopic beats never follow each other.
#[derive(Debug, Clone)]
pub struct EctopyState {
    config: EctopyConfig,
    last_ectopic: Option<usize>,
    rng: SeededRng,
}

impl EctopyState {
    pub fn new(config: EctopyConfig, seed: u32) -> Self {
        Self {
            config,
            last_ectopic: None,
            rng: SeededRng::for_stage(seed, Stream::Ectopy),
        }
    }

    pub fn kind(&self) -> EctopyKind {
        self.config.kind
    }

    pub fn last_ectopic(&self) -> Option<usize> {
        self.last_ectopic
    }

    /// Returns the ectopic kind when beat `index` fires early.
    pub fn step(&mut self, index: usize) -> Option<EctopyKind> {
        if self.config.kind == EctopyKind::None || self.config.probability <= 0.0 || index == 0 {
            return None;
        }
        if let Some(last) = self.last_ectopic {
            if last + 1 == index {
                return None;
            }
        }
        if self.rng.chance(self.config.probability) {
            trace!("beat {index} is ectopic ({:?})", self.config.kind);
            self.last_ectopic = Some(index);
            Some(self.config.kind)
        } else {
            None
        }
    }

    /// Coupling interval in seconds for an ectopic beat following an RR of `rr`.
    ///
    /// Drawn from 0.6–0.8 of the sinus RR, then held inside 0.5–0.8 s; both
    /// bounds shrink with RR so fast rhythms keep the beat premature.
    pub fn coupling_interval(&mut self, rr: f64) -> f64 {
        let lo = 0.5_f64.min(0.6 * rr);
        let hi = 0.8_f64.min(0.8 * rr);
        (self.rng.range(0.6, 0.8) * rr).clamp(lo, hi)
    }
}
