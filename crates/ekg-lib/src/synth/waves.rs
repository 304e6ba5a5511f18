//! Pulse shapes and the cardiac dipole they are accumulated into.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub fn gaussian(t: f64, sigma: f64) -> f64 {
    (-0.5 * (t / sigma).powi(2)).exp()
}

/// Gaussian with separate widths on each side of the peak.
pub fn asymmetric_gaussian(t: f64, sigma_left: f64, sigma_right: f64) -> f64 {
    let sigma = if t < 0.0 { sigma_left } else { sigma_right };
    gaussian(t, sigma)
}

/// `exp(-0.5 |t/σ|^p)`: p < 2 gives a peaked tent, p > 2 a flat top.
pub fn generalized_gaussian(t: f64, sigma: f64, power: f64) -> f64 {
    (-0.5 * (t / sigma).abs().powf(power)).exp()
}

/// Orthonormal Hermite function of order `n` at `x`.
pub fn hermite_function(n: usize, x: f64) -> f64 {
    // psi_0 = pi^-1/4 e^-x^2/2, psi_{k+1} = sqrt(2/(k+1)) x psi_k - sqrt(k/(k+1)) psi_{k-1}
    let mut prev = 0.0;
    let mut cur = PI.powf(-0.25) * (-0.5 * x * x).exp();
    for k in 0..n {
        let kf = k as f64;
        let next = (2.0 / (kf + 1.0)).sqrt() * x * cur - (kf / (kf + 1.0)).sqrt() * prev;
        prev = cur;
        cur = next;
    }
    cur
}

/// Weighted sum of Hermite functions; `weights[n]` scales order `n`.
pub fn hermite_complex(x: f64, weights: &[f64]) -> f64 {
    weights
        .iter()
        .enumerate()
        .filter(|(_, w)| **w != 0.0)
        .map(|(n, w)| w * hermite_function(n, x))
        .sum()
}

/// Positive lobe followed by a negative lobe, centres `separation` apart.
pub fn biphasic(t: f64, sigma: f64, separation: f64) -> f64 {
    gaussian(t + 0.5 * separation, sigma) - gaussian(t - 0.5 * separation, sigma)
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Smooth rectangular window, ~1 inside [start, end] with soft edges.
pub fn phase_window(t: f64, start: f64, end: f64, edge: f64) -> f64 {
    sigmoid((t - start) / edge) * sigmoid((end - t) / edge)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PulseShape {
    Gaussian { sigma: f64 },
    Asymmetric { sigma_left: f64, sigma_right: f64 },
    Generalized { sigma: f64, power: f64 },
    Hermite { sigma: f64, weights: Vec<f64> },
    Biphasic { sigma: f64, separation: f64 },
    /// Slurred pre-excitation upstroke starting at t = 0.
    Delta { duration: f64 },
}

impl PulseShape {
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            PulseShape::Gaussian { sigma } => gaussian(t, *sigma),
            PulseShape::Asymmetric {
                sigma_left,
                sigma_right,
            } => asymmetric_gaussian(t, *sigma_left, *sigma_right),
            PulseShape::Generalized { sigma, power } => generalized_gaussian(t, *sigma, *power),
            PulseShape::Hermite { sigma, weights } => hermite_complex(t / sigma, weights),
            PulseShape::Biphasic { sigma, separation } => biphasic(t, *sigma, *separation),
            PulseShape::Delta { duration } => {
                let d = *duration;
                sigmoid((t - 0.6 * d) / (0.18 * d)) * phase_window(t, -d, 1.4 * d, 0.1 * d)
            }
        }
    }

    /// Interval outside which the pulse is treated as zero.
    pub fn support(&self) -> (f64, f64) {
        match self {
            PulseShape::Gaussian { sigma } => (-5.0 * sigma, 5.0 * sigma),
            PulseShape::Asymmetric {
                sigma_left,
                sigma_right,
            } => (-5.0 * sigma_left, 5.0 * sigma_right),
            PulseShape::Generalized { sigma, power } => {
                // exp(-0.5 u^p) < 1e-5 beyond u = 23^(1/p)
                let reach = sigma * 23.0_f64.powf(1.0 / power.max(0.5));
                (-reach, reach)
            }
            PulseShape::Hermite { sigma, weights } => {
                let order = weights.len().saturating_sub(1) as f64;
                let reach = sigma * ((2.0 * order + 1.0).sqrt() + 5.0);
                (-reach, reach)
            }
            PulseShape::Biphasic { sigma, separation } => {
                let reach = 0.5 * separation + 5.0 * sigma;
                (-reach, reach)
            }
            PulseShape::Delta { duration } => (-duration, 2.5 * duration),
        }
    }

    /// Signed area under the unit pulse.
    pub fn area(&self) -> f64 {
        let (lo, hi) = self.support();
        let steps = 4000;
        let dt = (hi - lo) / steps as f64;
        (0..steps)
            .map(|i| self.eval(lo + (i as f64 + 0.5) * dt))
            .sum::<f64>()
            * dt
    }

    /// Distance from the peak to where the tangent at the steepest point of
    /// the trailing edge crosses zero.
    pub fn tangent_end(&self) -> Option<f64> {
        match self {
            PulseShape::Gaussian { sigma } => Some(2.0 * sigma),
            PulseShape::Asymmetric { sigma_right, .. } => Some(2.0 * sigma_right),
            PulseShape::Generalized { sigma, power } if *power > 1.0 => {
                let p = *power;
                let up = 2.0 * (p - 1.0) / p;
                let u = up.powf(1.0 / p);
                let value = (-0.5 * up).exp();
                let slope = 0.5 * p * u.powf(p - 1.0) * value;
                Some(sigma * (u + value / slope))
            }
            _ => None,
        }
    }
}

/// One dipole contribution: a pulse along a fixed 3-D direction.
///
/// Axes: x to the patient's left, y inferior, z anterior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveComponent {
    pub shape: PulseShape,
    /// Centre relative to the preset's anchor time (s).
    pub offset_s: f64,
    pub amplitude_uv: f64,
    pub direction: [f64; 3],
}

impl WaveComponent {
    pub fn new(shape: PulseShape, offset_s: f64, amplitude_uv: f64, direction: [f64; 3]) -> Self {
        Self {
            shape,
            offset_s,
            amplitude_uv,
            direction: unit(direction),
        }
    }
}

/// Named group of components placed together (a P wave, a QRS complex…).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePreset {
    pub name: String,
    pub components: Vec<WaveComponent>,
}

impl WavePreset {
    pub fn new(name: impl Into<String>, components: Vec<WaveComponent>) -> Self {
        Self {
            name: name.into(),
            components,
        }
    }

    /// Add the preset, anchored at `anchor_s` and scaled by `gain`, into `vcg`.
    pub fn accumulate(&self, vcg: &mut Vcg, anchor_s: f64, gain: f64) {
        let n = vcg.len();
        if n == 0 {
            return;
        }
        for c in &self.components {
            let centre = anchor_s + c.offset_s;
            let (lo, hi) = c.shape.support();
            let first = ((centre + lo) * vcg.fs).ceil().max(0.0) as usize;
            let last = ((centre + hi) * vcg.fs).floor();
            if last < 0.0 || first >= n {
                continue;
            }
            let last = (last as usize).min(n - 1);
            let amp = c.amplitude_uv * gain;
            for i in first..=last {
                let v = amp * c.shape.eval(i as f64 / vcg.fs - centre);
                vcg.x[i] += v * c.direction[0];
                vcg.y[i] += v * c.direction[1];
                vcg.z[i] += v * c.direction[2];
            }
        }
    }

    /// Net dipole area (µV·s) of the preset.
    pub fn net_vector(&self) -> [f64; 3] {
        let mut acc = [0.0; 3];
        for c in &self.components {
            let area = c.amplitude_uv * c.shape.area();
            for (a, d) in acc.iter_mut().zip(c.direction) {
                *a += area * d;
            }
        }
        acc
    }

    /// Frontal-plane axis of the net dipole, degrees.
    pub fn frontal_axis_deg(&self) -> f64 {
        let v = self.net_vector();
        v[1].atan2(v[0]).to_degrees()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Sampled cardiac dipole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vcg {
    pub fs: f64,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl Vcg {
    pub fn zeros(fs: f64, samples: usize) -> Self {
        Self {
            fs,
            x: vec![0.0; samples],
            y: vec![0.0; samples],
            z: vec![0.0; samples],
        }
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn sample(&self, i: usize) -> [f64; 3] {
        [self.x[i], self.y[i], self.z[i]]
    }
}

pub fn unit(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm == 0.0 {
        v
    } else {
        [v[0] / norm, v[1] / norm, v[2] / norm]
    }
}

/// Unit vector at `axis_deg` in the frontal plane tilted by `z` toward the front.
pub fn frontal(axis_deg: f64, z: f64) -> [f64; 3] {
    let a = axis_deg.to_radians();
    unit([a.cos(), a.sin(), z])
}
