//! Beat templates and their rendering into a dipole time series.

use log::debug;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::record::Axes;
use crate::synth::params::{AgeProfile, Diagnosis, Pathology};
use crate::synth::random::{SeededRng, Stream};
use crate::synth::rhythm::BeatSchedule;
use crate::synth::waves::{frontal, PulseShape, Vcg, WaveComponent, WavePreset};

const SEPTAL_DIR: [f64; 3] = [-0.6, 0.25, 0.75];
const TERMINAL_DIR: [f64; 3] = [-0.35, -0.55, -0.75];

/// T wave preset anchored at its peak, and where its tangent-defined end lies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TWave {
    pub preset: WavePreset,
    pub end_offset_s: f64,
}

/// Waveform building blocks for one diagnosis at one age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatTemplate {
    /// Sinus P, anchored at P onset; `None` when atrial activity is hidden.
    pub p: Option<WavePreset>,
    /// Premature atrial P, anchored at P onset.
    pub pac_p: WavePreset,
    /// Anchored at QRS onset.
    pub qrs: WavePreset,
    /// ST-segment shift, anchored at QRS onset.
    pub st: Option<WavePreset>,
    pub t: TWave,
    /// Complete premature ventricular complex with its own T, anchored at onset.
    pub pvc: WavePreset,
    pub qtc_s: f64,
    pub qrs_s: f64,
}

struct Basis {
    rr0: f64,
    qrs_amp: f64,
    qrs_norm: f64,
    qrs_s: f64,
    axis: f64,
    p_amp: f64,
    p_dur: f64,
    p_axis: f64,
    t_amp: f64,
    t_axis: f64,
    /// Right-side T width, from the resting QT.
    t_sigma: f64,
}

fn normal_qrs(width: f64, amp: f64, axis: f64, z_main: f64) -> Vec<WaveComponent> {
    vec![
        WaveComponent::new(
            PulseShape::Gaussian { sigma: width / 12.0 },
            0.2 * width,
            0.18 * amp,
            SEPTAL_DIR,
        ),
        WaveComponent::new(
            PulseShape::Gaussian { sigma: width / 8.5 },
            0.48 * width,
            amp,
            frontal(axis, z_main),
        ),
        WaveComponent::new(
            PulseShape::Gaussian { sigma: width / 11.0 },
            0.76 * width,
            0.28 * amp,
            TERMINAL_DIR,
        ),
    ]
}

fn p_wave(name: &str, duration: f64, amp: f64, axis: f64) -> WavePreset {
    let sigma = duration / 5.5;
    WavePreset::new(
        name,
        vec![WaveComponent::new(
            PulseShape::Gaussian { sigma },
            0.5 * duration,
            amp,
            frontal(axis, 0.15),
        )],
    )
}

fn asymmetric_t(sigma_right: f64, amp: f64, direction: [f64; 3]) -> TWave {
    let shape = PulseShape::Asymmetric {
        sigma_left: 1.4 * sigma_right,
        sigma_right,
    };
    let end_offset_s = shape.tangent_end().unwrap_or(2.0 * sigma_right);
    TWave {
        preset: WavePreset::new("T", vec![WaveComponent::new(shape, 0.0, amp, direction)]),
        end_offset_s,
    }
}

fn pvc_complex(b: &Basis) -> WavePreset {
    let width = (1.7 * b.qrs_norm).max(0.12);
    let t_sigma = 1.2 * b.t_sigma;
    WavePreset::new(
        "PVC",
        vec![
            WaveComponent::new(
                PulseShape::Hermite {
                    sigma: width / 7.0,
                    weights: vec![1.0, 0.6, 0.25],
                },
                0.5 * width,
                1.5 * b.qrs_amp,
                [0.4, -0.6, -0.7],
            ),
            WaveComponent::new(
                PulseShape::Asymmetric {
                    sigma_left: 1.4 * t_sigma,
                    sigma_right: t_sigma,
                },
                width + 0.18,
                1.6 * b.t_amp,
                [-0.4, 0.6, 0.7],
            ),
        ],
    )
}

impl BeatTemplate {
    /// One construction per diagnosis, selected once per synthesis call.
    pub fn for_diagnosis(dx: Diagnosis, profile: &AgeProfile, pathology: &Pathology) -> Self {
        let rr0 = pathology.rr_s(profile);
        let basis = Basis {
            rr0,
            qrs_amp: profile.qrs_amp_uv,
            qrs_norm: profile.qrs_s,
            qrs_s: pathology.qrs_s,
            axis: profile.qrs_axis_deg,
            p_amp: profile.p_amp_uv,
            p_dur: pathology.p_duration_s,
            p_axis: profile.p_axis_deg,
            t_amp: profile.t_amp_uv,
            t_axis: profile.t_axis_deg,
            t_sigma: 0.1 * pathology.qtc_s * rr0.sqrt(),
        };
        let mut template = Self::normal(&basis, pathology);
        match dx {
            Diagnosis::NormalSinus
            | Diagnosis::SinusBradycardia
            | Diagnosis::SinusTachycardia
            | Diagnosis::FirstDegreeAvb
            | Diagnosis::Wenckebach
            | Diagnosis::MobitzII
            | Diagnosis::CompleteAvb
            | Diagnosis::Pacs
            | Diagnosis::Pvcs
            | Diagnosis::LongQt
            | Diagnosis::Brugada => {}
            Diagnosis::SvtNarrow => template.p = None,
            Diagnosis::Rbbb => template.apply_rbbb(&basis),
            Diagnosis::Lbbb => template.apply_lbbb(&basis),
            Diagnosis::Lafb => template.apply_lafb(&basis),
            Diagnosis::Lvh => template.apply_lvh(&basis),
            Diagnosis::Rvh => template.apply_rvh(&basis),
            Diagnosis::Wpw => template.apply_wpw(&basis),
            Diagnosis::Hyperkalemia => template.apply_hyperkalemia(&basis),
            Diagnosis::Pericarditis => template.apply_pericarditis(&basis),
            Diagnosis::LeftAtrialEnlargement => template.apply_lae(&basis),
        }
        debug!(
            "{dx} template: QRS {:.0} ms, QTc {:.0} ms, QRS axis {:.0} deg",
            template.qrs_s * 1000.0,
            template.qtc_s * 1000.0,
            template.qrs.frontal_axis_deg()
        );
        template
    }

    fn normal(b: &Basis, pathology: &Pathology) -> Self {
        Self {
            p: Some(p_wave("P", b.p_dur, b.p_amp, b.p_axis)),
            pac_p: p_wave("P'", b.p_dur, 0.8 * b.p_amp, -40.0),
            qrs: WavePreset::new("QRS", normal_qrs(b.qrs_s, b.qrs_amp, b.axis, -0.35)),
            st: None,
            t: asymmetric_t(b.t_sigma, b.t_amp, frontal(b.t_axis, 0.35)),
            pvc: pvc_complex(b),
            qtc_s: pathology.qtc_s,
            qrs_s: pathology.qrs_s,
        }
    }

    /// Normal early activation, then a slurred rightward-anterior R'.
    fn apply_rbbb(&mut self, b: &Basis) {
        let mut components = normal_qrs(b.qrs_norm, b.qrs_amp, b.axis, -0.35);
        components.truncate(2);
        let start = 0.8 * b.qrs_norm;
        let span = b.qrs_s - start;
        components.push(WaveComponent::new(
            PulseShape::Hermite {
                sigma: span / 6.5,
                weights: vec![1.0, 0.0, 0.35],
            },
            start + 0.5 * span,
            0.45 * b.qrs_amp,
            [-0.55, 0.1, 0.8],
        ));
        self.qrs = WavePreset::new("QRS", components);
        self.t = asymmetric_t(b.t_sigma, 0.8 * b.t_amp, frontal(30.0, -0.5));
    }

    /// No septal forces; broad notched leftward-posterior complex, discordant T.
    fn apply_lbbb(&mut self, b: &Basis) {
        self.qrs = WavePreset::new(
            "QRS",
            vec![WaveComponent::new(
                PulseShape::Hermite {
                    sigma: b.qrs_s / 7.5,
                    weights: vec![1.0, 0.0, 0.8],
                },
                0.5 * b.qrs_s,
                1.1 * b.qrs_amp,
                [0.75, 0.25, -0.6],
            )],
        );
        self.t = asymmetric_t(b.t_sigma, 1.2 * b.t_amp, [-0.6, -0.1, 0.6]);
    }

    fn apply_lafb(&mut self, b: &Basis) {
        let mut components = normal_qrs(b.qrs_s, b.qrs_amp, -55.0, -0.35);
        components[0].direction = frontal(100.0, 0.5);
        self.qrs = WavePreset::new("QRS", components);
    }

    /// Increased posterior-leftward voltage with lateral strain.
    fn apply_lvh(&mut self, b: &Basis) {
        self.qrs = WavePreset::new(
            "QRS",
            normal_qrs(b.qrs_s, 2.0 * b.qrs_amp, b.axis.min(45.0), -0.6),
        );
        self.t = asymmetric_t(b.t_sigma, 0.8 * b.t_amp, frontal(-140.0, 0.5));
    }

    fn apply_rvh(&mut self, b: &Basis) {
        self.qrs = WavePreset::new("QRS", normal_qrs(b.qrs_s, 1.2 * b.qrs_amp, 115.0, 0.6));
        self.t = asymmetric_t(b.t_sigma, b.t_amp, frontal(40.0, -0.2));
    }

    /// Delta-wave upstroke ahead of a normally conducted complex.
    fn apply_wpw(&mut self, b: &Basis) {
        let delta = (b.qrs_s - b.qrs_norm).max(0.02);
        let mut components = vec![WaveComponent::new(
            PulseShape::Delta { duration: delta },
            0.0,
            0.3 * b.qrs_amp,
            frontal(b.axis, -0.35),
        )];
        for mut c in normal_qrs(b.qrs_norm, b.qrs_amp, b.axis, -0.35) {
            c.offset_s += delta;
            components.push(c);
        }
        self.qrs = WavePreset::new("QRS", components);
        self.t = asymmetric_t(b.t_sigma, 0.8 * b.t_amp, frontal(b.t_axis, 0.0));
    }

    /// Tall narrow peaked T, flattened P.
    fn apply_hyperkalemia(&mut self, b: &Basis) {
        let shape = PulseShape::Generalized {
            sigma: 0.7 * b.t_sigma,
            power: 1.3,
        };
        let end_offset_s = shape.tangent_end().unwrap_or(2.0 * b.t_sigma);
        self.t = TWave {
            preset: WavePreset::new(
                "T",
                vec![WaveComponent::new(
                    shape,
                    0.0,
                    2.3 * b.t_amp,
                    frontal(b.t_axis, 0.45),
                )],
            ),
            end_offset_s,
        };
        self.p = Some(p_wave("P", b.p_dur, 0.4 * b.p_amp, b.p_axis));
    }

    /// Diffuse flat-topped ST elevation between the J point and the T wave.
    fn apply_pericarditis(&mut self, b: &Basis) {
        let qt = self.qt_for_rr(b.rr0);
        let j = b.qrs_s;
        let t_rise = qt - self.t.end_offset_s - 2.0 * 1.4 * b.t_sigma;
        let width = (t_rise - j).max(0.04);
        self.st = Some(WavePreset::new(
            "ST",
            vec![WaveComponent::new(
                PulseShape::Generalized {
                    sigma: 0.5 * width,
                    power: 6.0,
                },
                j + 0.5 * width,
                120.0,
                frontal(50.0, 0.4),
            )],
        ));
    }

    /// Broad notched P with a terminal posterior component.
    fn apply_lae(&mut self, b: &Basis) {
        let d = b.p_dur;
        self.p = Some(WavePreset::new(
            "P",
            vec![
                WaveComponent::new(
                    PulseShape::Gaussian { sigma: d / 8.0 },
                    0.3 * d,
                    0.6 * b.p_amp,
                    frontal(60.0, 0.4),
                ),
                WaveComponent::new(
                    PulseShape::Gaussian { sigma: d / 7.0 },
                    0.65 * d,
                    0.8 * b.p_amp,
                    [0.6, 0.3, -0.75],
                ),
                WaveComponent::new(
                    PulseShape::Biphasic {
                        sigma: d / 8.0,
                        separation: d / 2.5,
                    },
                    0.5 * d,
                    0.5 * b.p_amp,
                    [0.0, 0.0, 1.0],
                ),
            ],
        ));
    }

    /// QT for a beat following an RR of `rr` seconds.
    pub fn qt_for_rr(&self, rr: f64) -> f64 {
        self.qtc_s * rr.clamp(0.25, 2.0).sqrt()
    }

    /// Frontal axes of the net P, QRS and T dipoles.
    pub fn axes(&self) -> Axes {
        Axes {
            p: self.p.as_ref().map(WavePreset::frontal_axis_deg),
            qrs: self.qrs.frontal_axis_deg(),
            t: self.t.preset.frontal_axis_deg(),
        }
    }
}

/// Render every scheduled beat into a dipole sampled at `fs`.
///
/// Each beat gets a small amplitude jitter, up to ±1 ms of timing jitter and a
/// respiratory amplitude modulation at `resp_hz`.
pub fn render(
    template: &BeatTemplate,
    schedule: &BeatSchedule,
    fs: f64,
    samples: usize,
    resp_hz: f64,
    seed: u32,
) -> Vcg {
    let mut vcg = Vcg::zeros(fs, samples);
    let mut rng = SeededRng::for_stage(seed, Stream::Morphology);
    let resp_phase = rng.range(0.0, 2.0 * PI);
    let rr0 = schedule.mean_rr().unwrap_or(1.0);

    for beat in &schedule.beats {
        let shift = rng.range(-0.001, 0.001);
        let jitter = 1.0 + 0.03 * rng.normal();
        let resp = 1.0 + 0.05 * (2.0 * PI * resp_hz * beat.time() + resp_phase).sin();
        let gain = jitter * resp;

        if let Some(p_on) = beat.p_time {
            let preset = if beat.flags.is_pac {
                Some(&template.pac_p)
            } else {
                template.p.as_ref()
            };
            if let Some(p) = preset {
                p.accumulate(&mut vcg, p_on + shift, gain);
            }
        }

        let Some(q_on) = beat.qrs_time else {
            continue;
        };
        let q_on = q_on + shift;
        if beat.flags.is_pvc {
            template.pvc.accumulate(&mut vcg, q_on, gain);
            continue;
        }
        template.qrs.accumulate(&mut vcg, q_on, gain);
        if let Some(st) = &template.st {
            st.accumulate(&mut vcg, q_on, gain);
        }
        let qt = template.qt_for_rr(beat.rr_prev.unwrap_or(rr0));
        let t_peak = q_on + qt - template.t.end_offset_s;
        template.t.preset.accumulate(&mut vcg, t_peak, gain);
    }
    vcg
}
