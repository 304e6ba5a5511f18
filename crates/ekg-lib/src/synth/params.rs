//! Age priors and per-diagnosis pathology tables.
//!
//! Both are immutable lookups built by pure functions; nothing here is cached
//! or mutated after construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EcgError;

/// Broad age class driving heart-rate-variability magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeGroup {
    Neonate,
    Child,
    Adult,
    Elderly,
}

impl AgeGroup {
    pub fn for_age(age_years: f64) -> Self {
        if age_years < 1.0 {
            AgeGroup::Neonate
        } else if age_years < 12.0 {
            AgeGroup::Child
        } else if age_years < 65.0 {
            AgeGroup::Adult
        } else {
            AgeGroup::Elderly
        }
    }

    /// Scale applied to every RR modulation band.
    fn hrv_factor(self) -> f64 {
        match self {
            AgeGroup::Neonate => 2.0,
            AgeGroup::Child => 1.4,
            AgeGroup::Adult => 1.0,
            AgeGroup::Elderly => 0.55,
        }
    }

    /// Respiratory frequency carrying the sinus arrhythmia.
    fn respiratory_hz(self) -> f64 {
        match self {
            AgeGroup::Neonate => 0.75,
            AgeGroup::Child => 0.4,
            AgeGroup::Adult => 0.3,
            AgeGroup::Elderly => 0.22,
        }
    }
}

/// RR modulation bands, amplitudes in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrvParams {
    pub rsa_amp_s: f64,
    pub rsa_hz: f64,
    pub lf_amp_s: f64,
    pub lf_hz: f64,
    pub vlf_amp_s: f64,
    pub vlf_hz: f64,
    pub jitter_s: f64,
}

impl HrvParams {
    pub fn for_group(group: AgeGroup) -> Self {
        let k = group.hrv_factor();
        Self {
            rsa_amp_s: 0.020 * k,
            rsa_hz: group.respiratory_hz(),
            lf_amp_s: 0.014 * k,
            lf_hz: 0.10,
            vlf_amp_s: 0.009 * k,
            vlf_hz: 0.025,
            jitter_s: 0.006 * k,
        }
    }

    /// Scale every amplitude; frequencies are untouched.
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            rsa_amp_s: self.rsa_amp_s * factor,
            lf_amp_s: self.lf_amp_s * factor,
            vlf_amp_s: self.vlf_amp_s * factor,
            jitter_s: self.jitter_s * factor,
            ..self
        }
    }
}

/// Normal values for one age, interpolated from a fixed knot table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgeProfile {
    pub age_years: f64,
    pub group: AgeGroup,
    pub hr_bpm: f64,
    pub pr_s: f64,
    pub qrs_s: f64,
    pub qtc_s: f64,
    pub p_axis_deg: f64,
    pub qrs_axis_deg: f64,
    pub t_axis_deg: f64,
    pub p_amp_uv: f64,
    pub qrs_amp_uv: f64,
    pub t_amp_uv: f64,
    pub hrv: HrvParams,
}

// age, HR, PR, QRS, QTc, QRS axis, QRS amplitude, T amplitude
const AGE_KNOTS: [[f64; 8]; 11] = [
    [0.0, 145.0, 0.100, 0.060, 0.400, 125.0, 1300.0, 260.0],
    [0.5, 135.0, 0.105, 0.062, 0.405, 85.0, 1450.0, 300.0],
    [1.0, 125.0, 0.110, 0.065, 0.410, 70.0, 1550.0, 320.0],
    [3.0, 108.0, 0.120, 0.070, 0.410, 65.0, 1650.0, 350.0],
    [5.0, 92.0, 0.130, 0.075, 0.415, 60.0, 1700.0, 360.0],
    [8.0, 78.0, 0.140, 0.080, 0.415, 60.0, 1650.0, 350.0],
    [12.0, 74.0, 0.145, 0.085, 0.420, 58.0, 1550.0, 330.0],
    [16.0, 72.0, 0.150, 0.088, 0.420, 55.0, 1450.0, 320.0],
    [30.0, 70.0, 0.160, 0.090, 0.420, 50.0, 1300.0, 300.0],
    [65.0, 68.0, 0.170, 0.094, 0.425, 40.0, 1150.0, 260.0],
    [90.0, 66.0, 0.175, 0.096, 0.430, 30.0, 1050.0, 230.0],
];

fn interpolate_knots(age: f64, column: usize) -> f64 {
    let first = &AGE_KNOTS[0];
    let last = &AGE_KNOTS[AGE_KNOTS.len() - 1];
    if age <= first[0] {
        return first[column];
    }
    if age >= last[0] {
        return last[column];
    }
    for pair in AGE_KNOTS.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if age >= a[0] && age <= b[0] {
            let w = (age - a[0]) / (b[0] - a[0]);
            return a[column] + w * (b[column] - a[column]);
        }
    }
    last[column]
}

impl AgeProfile {
    pub fn for_age(age_years: f64) -> Self {
        let age = age_years.max(0.0);
        let group = AgeGroup::for_age(age);
        let pr_s = interpolate_knots(age, 2);
        Self {
            age_years: age,
            group,
            hr_bpm: interpolate_knots(age, 1),
            pr_s,
            qrs_s: interpolate_knots(age, 3),
            qtc_s: interpolate_knots(age, 4),
            p_axis_deg: 55.0,
            qrs_axis_deg: interpolate_knots(age, 5),
            t_axis_deg: 40.0,
            p_amp_uv: if age < 1.0 { 150.0 } else { 120.0 },
            qrs_amp_uv: interpolate_knots(age, 6),
            t_amp_uv: interpolate_knots(age, 7),
            hrv: HrvParams::for_group(group),
        }
    }

    pub fn rr_s(&self) -> f64 {
        60.0 / self.hr_bpm
    }

    /// P wave duration scales with the PR interval.
    pub fn p_duration_s(&self) -> f64 {
        (0.55 * self.pr_s).clamp(0.05, 0.11)
    }
}

/// Supported diagnosis labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Diagnosis {
    #[serde(rename = "Normal sinus")]
    NormalSinus,
    #[serde(rename = "Sinus bradycardia")]
    SinusBradycardia,
    #[serde(rename = "Sinus tachycardia")]
    SinusTachycardia,
    #[serde(rename = "SVT (narrow)")]
    SvtNarrow,
    #[serde(rename = "1st degree AVB")]
    FirstDegreeAvb,
    #[serde(rename = "2nd degree AVB (Wenckebach)")]
    Wenckebach,
    #[serde(rename = "2nd degree AVB (Mobitz II)")]
    MobitzII,
    #[serde(rename = "3rd degree AVB")]
    CompleteAvb,
    #[serde(rename = "PACs")]
    Pacs,
    #[serde(rename = "PVCs")]
    Pvcs,
    #[serde(rename = "RBBB")]
    Rbbb,
    #[serde(rename = "LBBB")]
    Lbbb,
    #[serde(rename = "LAFB")]
    Lafb,
    #[serde(rename = "LVH")]
    Lvh,
    #[serde(rename = "RVH")]
    Rvh,
    #[serde(rename = "WPW")]
    Wpw,
    #[serde(rename = "Long QT")]
    LongQt,
    #[serde(rename = "Hyperkalemia")]
    Hyperkalemia,
    #[serde(rename = "Pericarditis")]
    Pericarditis,
    #[serde(rename = "Brugada pattern")]
    Brugada,
    #[serde(rename = "Left atrial enlargement")]
    LeftAtrialEnlargement,
}

impl Diagnosis {
    pub const ALL: [Diagnosis; 21] = [
        Diagnosis::NormalSinus,
        Diagnosis::SinusBradycardia,
        Diagnosis::SinusTachycardia,
        Diagnosis::SvtNarrow,
        Diagnosis::FirstDegreeAvb,
        Diagnosis::Wenckebach,
        Diagnosis::MobitzII,
        Diagnosis::CompleteAvb,
        Diagnosis::Pacs,
        Diagnosis::Pvcs,
        Diagnosis::Rbbb,
        Diagnosis::Lbbb,
        Diagnosis::Lafb,
        Diagnosis::Lvh,
        Diagnosis::Rvh,
        Diagnosis::Wpw,
        Diagnosis::LongQt,
        Diagnosis::Hyperkalemia,
        Diagnosis::Pericarditis,
        Diagnosis::Brugada,
        Diagnosis::LeftAtrialEnlargement,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Diagnosis::NormalSinus => "Normal sinus",
            Diagnosis::SinusBradycardia => "Sinus bradycardia",
            Diagnosis::SinusTachycardia => "Sinus tachycardia",
            Diagnosis::SvtNarrow => "SVT (narrow)",
            Diagnosis::FirstDegreeAvb => "1st degree AVB",
            Diagnosis::Wenckebach => "2nd degree AVB (Wenckebach)",
            Diagnosis::MobitzII => "2nd degree AVB (Mobitz II)",
            Diagnosis::CompleteAvb => "3rd degree AVB",
            Diagnosis::Pacs => "PACs",
            Diagnosis::Pvcs => "PVCs",
            Diagnosis::Rbbb => "RBBB",
            Diagnosis::Lbbb => "LBBB",
            Diagnosis::Lafb => "LAFB",
            Diagnosis::Lvh => "LVH",
            Diagnosis::Rvh => "RVH",
            Diagnosis::Wpw => "WPW",
            Diagnosis::LongQt => "Long QT",
            Diagnosis::Hyperkalemia => "Hyperkalemia",
            Diagnosis::Pericarditis => "Pericarditis",
            Diagnosis::Brugada => "Brugada pattern",
            Diagnosis::LeftAtrialEnlargement => "Left atrial enlargement",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            Diagnosis::NormalSinus => &["normal", "nsr", "sinus"],
            Diagnosis::SinusBradycardia => &["brady", "sinus brady"],
            Diagnosis::SinusTachycardia => &["tachy", "sinus tachy"],
            Diagnosis::SvtNarrow => &["svt"],
            Diagnosis::FirstDegreeAvb => &["1avb", "first degree avb", "1st degree av block"],
            Diagnosis::Wenckebach => &["wenckebach", "mobitz i", "2avb1"],
            Diagnosis::MobitzII => &["mobitz ii", "2avb2"],
            Diagnosis::CompleteAvb => &["3avb", "complete heart block", "chb"],
            Diagnosis::Pacs => &["pac"],
            Diagnosis::Pvcs => &["pvc"],
            Diagnosis::Rbbb => &[],
            Diagnosis::Lbbb => &[],
            Diagnosis::Lafb => &[],
            Diagnosis::Lvh => &[],
            Diagnosis::Rvh => &[],
            Diagnosis::Wpw => &["preexcitation"],
            Diagnosis::LongQt => &["lqts", "long qt syndrome"],
            Diagnosis::Hyperkalemia => &["hyperk"],
            Diagnosis::Pericarditis => &[],
            Diagnosis::Brugada => &["brugada"],
            Diagnosis::LeftAtrialEnlargement => &["lae", "p mitrale"],
        }
    }

    /// Rhythm and interval changes this diagnosis imposes on the age priors.
    pub fn pathology(self, profile: &AgeProfile) -> Pathology {
        let base = Pathology::baseline(profile);
        match self {
            Diagnosis::NormalSinus | Diagnosis::Pericarditis | Diagnosis::Lvh | Diagnosis::Rvh => {
                base
            }
            Diagnosis::SinusBradycardia => Pathology {
                rate_scale: 0.65,
                ..base
            },
            Diagnosis::SinusTachycardia => Pathology {
                rate_scale: 1.45,
                ..base
            },
            Diagnosis::SvtNarrow => {
                let target = (profile.hr_bpm * 1.6).clamp(180.0, 230.0);
                Pathology {
                    rate_scale: target / profile.hr_bpm,
                    hrv_scale: 0.15,
                    conduction: Conduction::HiddenP,
                    ..base
                }
            }
            Diagnosis::FirstDegreeAvb => Pathology {
                pr_s: profile.pr_s * 1.6,
                ..base
            },
            Diagnosis::Wenckebach => Pathology {
                conduction: Conduction::Wenckebach {
                    conducted: 3,
                    increment_s: 0.6 * profile.pr_s,
                },
                pr_s: profile.pr_s * 1.15,
                ..base
            },
            Diagnosis::MobitzII => Pathology {
                conduction: Conduction::MobitzII { ratio: 3 },
                ..base
            },
            Diagnosis::CompleteAvb => {
                let escape_bpm = match profile.group {
                    AgeGroup::Neonate => 65.0,
                    AgeGroup::Child => 52.0,
                    AgeGroup::Adult | AgeGroup::Elderly => 40.0,
                };
                Pathology {
                    conduction: Conduction::Complete { escape_bpm },
                    qrs_s: profile.qrs_s * 1.25,
                    ..base
                }
            }
            Diagnosis::Pacs => Pathology {
                ectopy: EctopyConfig {
                    kind: EctopyKind::Pac,
                    probability: 0.12,
                },
                ..base
            },
            Diagnosis::Pvcs => Pathology {
                ectopy: EctopyConfig {
                    kind: EctopyKind::Pvc,
                    probability: 0.12,
                },
                ..base
            },
            Diagnosis::Rbbb => Pathology {
                qrs_s: (profile.qrs_s * 1.45).max(0.12),
                ..base
            },
            Diagnosis::Lbbb => Pathology {
                qrs_s: (profile.qrs_s * 1.6).max(0.14),
                ..base
            },
            Diagnosis::Lafb => Pathology {
                qrs_s: profile.qrs_s * 1.1,
                ..base
            },
            Diagnosis::Wpw => Pathology {
                pr_s: profile.pr_s * 0.6,
                qrs_s: profile.qrs_s + 0.035,
                ..base
            },
            Diagnosis::LongQt => Pathology {
                qtc_s: 0.50,
                ..base
            },
            Diagnosis::Hyperkalemia => Pathology {
                pr_s: profile.pr_s * 1.15,
                qrs_s: profile.qrs_s * 1.15,
                qtc_s: profile.qtc_s - 0.03,
                ..base
            },
            Diagnosis::Brugada => Pathology {
                qrs_s: profile.qrs_s * 1.15,
                ..base
            },
            Diagnosis::LeftAtrialEnlargement => Pathology {
                p_duration_s: (profile.p_duration_s() * 1.4).max(0.11),
                pr_s: profile.pr_s * 1.1,
                ..base
            },
        }
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Diagnosis {
    type Err = EcgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Diagnosis::ALL
            .iter()
            .copied()
            .find(|dx| {
                dx.label().to_ascii_lowercase() == wanted || dx.aliases().contains(&wanted.as_str())
            })
            .ok_or_else(|| EcgError::UnknownDiagnosis(s.to_string()))
    }
}

/// How atrial activity reaches the ventricles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Conduction {
    Normal,
    /// Atrial activity buried in the QRS; no discrete P waves.
    HiddenP,
    /// PR lengthens over `conducted` beats, then one P is blocked.
    Wenckebach { conducted: usize, increment_s: f64 },
    /// Every `ratio`-th P is blocked at a fixed PR.
    MobitzII { ratio: usize },
    /// Atria and ventricles dissociated; ventricles driven by an escape focus.
    Complete { escape_bpm: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EctopyKind {
    #[default]
    None,
    Pac,
    Pvc,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EctopyConfig {
    pub kind: EctopyKind,
    pub probability: f64,
}

/// Interval and rhythm parameters after applying a diagnosis to age priors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pathology {
    pub rate_scale: f64,
    pub hrv_scale: f64,
    pub pr_s: f64,
    pub qrs_s: f64,
    pub qtc_s: f64,
    pub p_duration_s: f64,
    pub conduction: Conduction,
    pub ectopy: EctopyConfig,
}

impl Pathology {
    fn baseline(profile: &AgeProfile) -> Self {
        Self {
            rate_scale: 1.0,
            hrv_scale: 1.0,
            pr_s: profile.pr_s,
            qrs_s: profile.qrs_s,
            qtc_s: profile.qtc_s,
            p_duration_s: profile.p_duration_s(),
            conduction: Conduction::Normal,
            ectopy: EctopyConfig::default(),
        }
    }

    /// Baseline RR after the rate variant is applied.
    pub fn rr_s(&self, profile: &AgeProfile) -> f64 {
        60.0 / (profile.hr_bpm * self.rate_scale)
    }

    /// RR modulation after the rate variant is applied; brady/tachy rhythms
    /// stretch the variability together with the baseline RR.
    pub fn hrv(&self, profile: &AgeProfile) -> HrvParams {
        profile.hrv.scaled(self.hrv_scale / self.rate_scale)
    }
}
