//! Acquisition device: artifacts, band-limiting, quantisation and clipping.

use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::dsp::bandpass;
use crate::error::Result;
use crate::record::{Lead, LeadSet};
use crate::synth::leads::derive_dependent;
use crate::synth::random::{SeededRng, Stream};
use crate::synth::waves::gaussian;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreset {
    #[default]
    Diagnostic,
    Monitor,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    pub gain: f64,
    pub clip_uv: f64,
}

impl DevicePreset {
    pub fn spec(self) -> DeviceSpec {
        match self {
            DevicePreset::Diagnostic => DeviceSpec {
                highpass_hz: 0.05,
                lowpass_hz: 150.0,
                gain: 1.0,
                clip_uv: 32_000.0,
            },
            DevicePreset::Monitor => DeviceSpec {
                highpass_hz: 0.5,
                lowpass_hz: 40.0,
                gain: 1.0,
                clip_uv: 5_000.0,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DevicePreset::Diagnostic => "diagnostic",
            DevicePreset::Monitor => "monitor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactPreset {
    #[default]
    None,
    Typical,
    Heavy,
}

/// Artifact amplitudes in µV (EMG as RMS).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub wander_uv: f64,
    pub powerline_uv: f64,
    pub emg_rms_uv: f64,
    pub motion_uv: f64,
    /// Mean motion transients per second.
    pub motion_rate_hz: f64,
}

impl ArtifactPreset {
    pub fn spec(self) -> ArtifactSpec {
        match self {
            ArtifactPreset::None => ArtifactSpec::default(),
            ArtifactPreset::Typical => ArtifactSpec {
                wander_uv: 60.0,
                powerline_uv: 8.0,
                emg_rms_uv: 6.0,
                motion_uv: 0.0,
                motion_rate_hz: 0.0,
            },
            ArtifactPreset::Heavy => ArtifactSpec {
                wander_uv: 200.0,
                powerline_uv: 25.0,
                emg_rms_uv: 20.0,
                motion_uv: 400.0,
                motion_rate_hz: 0.25,
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ArtifactPreset::None => "none",
            ArtifactPreset::Typical => "typical",
            ArtifactPreset::Heavy => "heavy",
        }
    }
}

/// Device-stage switches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceOptions {
    pub preset: DevicePreset,
    pub artifacts: ArtifactPreset,
    pub filters: bool,
    pub noise: bool,
    pub mains_hz: f64,
    /// Overrides the preset gain.
    pub gain: Option<f64>,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            preset: DevicePreset::Diagnostic,
            artifacts: ArtifactPreset::None,
            filters: true,
            noise: true,
            mains_hz: 50.0,
            gain: None,
        }
    }
}

impl DeviceOptions {
    pub fn spec(&self) -> DeviceSpec {
        let mut spec = self.preset.spec();
        if let Some(gain) = self.gain {
            spec.gain = gain;
        }
        spec
    }
}

/// Fraction of the wander amplitude drawn independently for each lead.
const LEAD_WANDER_FRACTION: f64 = 0.15;

fn add_wander(out: &mut [f64], amplitude_uv: f64, fs: f64, rng: &mut SeededRng) {
    let scale = amplitude_uv * rng.range(0.5, 1.0);
    let (f1, f2) = (rng.range(0.15, 0.3), rng.range(0.03, 0.08));
    let (ph1, ph2) = (rng.range(0.0, 2.0 * PI), rng.range(0.0, 2.0 * PI));
    for (i, v) in out.iter_mut().enumerate() {
        let t = i as f64 / fs;
        *v += scale * (0.7 * (2.0 * PI * f1 * t + ph1).sin() + 0.3 * (2.0 * PI * f2 * t + ph2).sin());
    }
}

/// Respiration wander and motion transients: one body, so one trace that
/// every electrode picks up.
fn shared_artifacts(spec: &ArtifactSpec, n: usize, fs: f64, rng: &mut SeededRng) -> Vec<f64> {
    let mut out = vec![0.0; n];
    if spec.wander_uv > 0.0 {
        add_wander(&mut out, spec.wander_uv, fs, rng);
    }

    if spec.motion_uv > 0.0 && spec.motion_rate_hz > 0.0 {
        let duration = n as f64 / fs;
        let count = (duration * spec.motion_rate_hz).round() as usize;
        for _ in 0..count {
            let centre = rng.range(0.0, duration);
            let amp = spec.motion_uv * if rng.chance(0.5) { 1.0 } else { -1.0 };
            let width = rng.range(0.05, 0.15);
            let first = ((centre - 5.0 * width) * fs).max(0.0) as usize;
            let last = (((centre + 5.0 * width) * fs) as usize).min(n);
            for (i, v) in out.iter_mut().enumerate().take(last).skip(first) {
                *v += amp * gaussian(i as f64 / fs - centre, width);
            }
        }
    }
    out
}

/// Per-lead artifacts on top of the scaled shared trace: a little wander of
/// its own, mains pickup and EMG.
fn lead_artifacts(
    spec: &ArtifactSpec,
    shared: &[f64],
    fs: f64,
    mains_hz: f64,
    rng: &mut SeededRng,
) -> Vec<f64> {
    let coupling = rng.range(0.7, 1.0);
    let mut out: Vec<f64> = shared.iter().map(|v| coupling * v).collect();

    if spec.wander_uv > 0.0 {
        add_wander(&mut out, LEAD_WANDER_FRACTION * spec.wander_uv, fs, rng);
    }

    if spec.powerline_uv > 0.0 {
        let scale = spec.powerline_uv * rng.range(0.5, 1.0);
        let phase = rng.range(0.0, 2.0 * PI);
        for (i, v) in out.iter_mut().enumerate() {
            *v += scale * (2.0 * PI * mains_hz * i as f64 / fs + phase).sin();
        }
    }

    if spec.emg_rms_uv > 0.0 {
        // AR(1) coloured noise with unit stationary variance before scaling.
        let a: f64 = 0.7;
        let drive = (1.0 - a * a).sqrt();
        let mut e = 0.0;
        for v in out.iter_mut() {
            e = a * e + drive * rng.normal();
            *v += spec.emg_rms_uv * e;
        }
    }
    out
}

/// Run the independent leads through the device, then rebuild every
/// dependent lead from the quantised basis.
///
/// Returns the number of clipped samples across all output leads.
pub fn apply_device(
    leads: &mut LeadSet,
    fs: f64,
    options: &DeviceOptions,
    extended: bool,
    seed: u32,
) -> Result<usize> {
    let spec = options.spec();
    let artifacts = options.artifacts.spec();
    let mut rng = SeededRng::for_stage(seed, Stream::Artifacts);
    let noisy = options.noise && options.artifacts != ArtifactPreset::None;
    let n = leads.values().map(Vec::len).max().unwrap_or(0);
    let shared = if noisy {
        shared_artifacts(&artifacts, n, fs, &mut rng)
    } else {
        Vec::new()
    };

    for lead in Lead::INDEPENDENT {
        let Some(samples) = leads.get_mut(&lead) else {
            continue;
        };
        if noisy {
            let noise = lead_artifacts(&artifacts, &shared, fs, options.mains_hz, &mut rng);
            for (s, n) in samples.iter_mut().zip(noise) {
                *s += n;
            }
        }
        for s in samples.iter_mut() {
            *s *= spec.gain;
        }
        if options.filters {
            *samples = bandpass(samples, fs, spec.highpass_hz, spec.lowpass_hz);
        }
        for s in samples.iter_mut() {
            *s = s.round().clamp(-spec.clip_uv, spec.clip_uv);
        }
    }

    derive_dependent(leads, extended)?;
    let mut clipped = 0;
    for (lead, samples) in leads.iter_mut() {
        let dependent = !Lead::INDEPENDENT.contains(lead);
        for s in samples.iter_mut() {
            if dependent {
                *s = s.round();
            }
            if s.abs() >= spec.clip_uv {
                clipped += 1;
                *s = s.clamp(-spec.clip_uv, spec.clip_uv);
            }
        }
    }
    debug!(
        "device {} (artifacts {}): {clipped} clipped samples",
        options.preset.name(),
        options.artifacts.name()
    );
    Ok(clipped)
}
