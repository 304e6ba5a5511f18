//! Signal quality and plausibility of a record: noise levels, spectral
//! shape, precordial R/S progression and age-normal reference ranges.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dsp::{single_pole_highpass, single_pole_lowpass, welch};
use crate::measure::global::GlobalMeasurements;
use crate::record::{EcgRecord, Lead, Targets};

/// Welch segment length for record spectra.
const SPECTRUM_SEGMENT_S: f64 = 4.0;
const WANDER_CUTOFF_HZ: f64 = 0.5;
const HF_NOISE_CUTOFF_HZ: f64 = 100.0;
const QRS_BAND_HZ: (f64, f64) = (5.0, 40.0);
const MAINS_HZ: [f64; 2] = [50.0, 60.0];
/// A mains bin must exceed its neighbours (±2 bins) by this factor and
/// hold at least this share of the total power.
const POWERLINE_PEAK_RATIO: f64 = 3.0;
const POWERLINE_MIN_SHARE: f64 = 1e-4;
/// Leads with less peak-to-peak swing than this are flat (µV).
const FLATLINE_UV: f64 = 10.0;
/// Below this S depth the R/S ratio is not meaningful (µV).
const MIN_S_UV: f64 = 10.0;
/// QRS complexes make ECG amplitudes heavy-tailed; noise and wander do not.
const MIN_KURTOSIS: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseMetrics {
    /// Standard deviation of the content below 0.5 Hz.
    #[serde(rename = "baseline_wander_uV")]
    pub baseline_wander_uv: f64,
    /// Standard deviation of the content above 100 Hz; needs fs > 200 Hz.
    #[serde(rename = "hf_noise_uV", default, skip_serializing_if = "Option::is_none")]
    pub hf_noise_uv: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub powerline_hz: Option<f64>,
    #[serde(rename = "powerline_uV", default, skip_serializing_if = "Option::is_none")]
    pub powerline_uv: Option<f64>,
    #[serde(rename = "snr_dB", default, skip_serializing_if = "Option::is_none")]
    pub snr_db: Option<f64>,
    pub kurtosis: f64,
}

/// Share of signal power per band, in percent of the total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectralMetrics {
    pub wander_pct: f64,
    pub qrs_band_pct: f64,
    pub hf_pct: f64,
    pub powerline_pct: f64,
    /// Shannon entropy of the normalised spectrum, 0..1.
    pub spectral_entropy: f64,
    pub centroid_hz: f64,
    pub qrs_band_plausible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MorphologyMetrics {
    /// Largest positive over largest negative deflection, V1..V6.
    pub rs_ratios: BTreeMap<Lead, f64>,
    /// First precordial pair where R/S crosses 1, e.g. "V3-V4".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_r_lead: Option<Lead>,
    /// R/S larger in V6 than in V1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rs_progression_ok: Option<bool>,
    pub flatline_leads: Vec<Lead>,
}

/// One value placed against its age reference (2nd/50th/98th percentile).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCheck {
    pub value: f64,
    pub p2: f64,
    pub p50: f64,
    pub p98: f64,
    /// Distance from the median in units of (p98 − p2) / 4.
    pub z: f64,
    pub percentile: f64,
    pub within_normal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgeNormals {
    pub age_years: f64,
    pub age_bin: String,
    pub checks: BTreeMap<String, ReferenceCheck>,
    pub outliers: Vec<String>,
    pub all_within_normal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise: Option<NoiseMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectrum: Option<SpectralMetrics>,
    pub morphology: MorphologyMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_normals: Option<AgeNormals>,
    /// Peaked enough to hold QRS complexes and no flat lead.
    pub acceptable: bool,
}

/// Clinical values to place against the age reference. Non-positive
/// durations and rates count as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClinicalValues {
    pub hr_bpm: Option<f64>,
    pub pr_ms: Option<f64>,
    pub qrs_ms: Option<f64>,
    pub qtc_ms: Option<f64>,
    pub qrs_axis_deg: Option<f64>,
}

impl ClinicalValues {
    pub fn from_targets(targets: &Targets) -> Self {
        let positive = |v: f64| (v > 0.0).then_some(v);
        Self {
            hr_bpm: positive(targets.hr_bpm),
            pr_ms: targets.pr_ms.and_then(positive),
            qrs_ms: positive(targets.qrs_ms),
            qtc_ms: positive(targets.qtc_ms),
            qrs_axis_deg: Some(targets.axes_deg.qrs),
        }
    }

    pub fn from_measurements(g: &GlobalMeasurements) -> Self {
        let positive = |v: f64| (v > 0.0).then_some(v);
        Self {
            hr_bpm: positive(g.HR_bpm),
            pr_ms: g.PR_ms.and_then(positive),
            qrs_ms: positive(g.QRS_ms),
            qtc_ms: g.QTc_bazett_ms.and_then(positive),
            qrs_axis_deg: g.QRS_axis_deg,
        }
    }
}

/// 2nd, 50th and 98th percentile.
type Band = (f64, f64, f64);

struct AgeReference {
    id: &'static str,
    /// Upper age bound in years (exclusive).
    until_years: f64,
    hr: Band,
    pr: Band,
    qrs: Band,
    qtc: Band,
    axis: Band,
}

/// Paediatric bins pool the boys' and girls' limits of Rijnbeek et al.
/// (2001): the median is their mean, the limits the wider of the two. The
/// adult bins are mean ± 2 SD.
static AGE_REFERENCE: [AgeReference; 11] = [
    AgeReference {
        id: "0-1m",
        until_years: 1.0 / 12.0,
        hr: (129.0, 157.5, 216.0),
        pr: (77.0, 100.0, 121.0),
        qrs: (50.0, 67.0, 85.0),
        qtc: (378.0, 416.5, 462.0),
        axis: (63.0, 103.5, 155.0),
    },
    AgeReference {
        id: "1-3m",
        until_years: 0.25,
        hr: (126.0, 153.0, 200.0),
        pr: (78.0, 98.5, 133.0),
        qrs: (48.0, 63.5, 77.0),
        qtc: (381.0, 421.5, 458.0),
        axis: (37.0, 83.5, 138.0),
    },
    AgeReference {
        id: "3-6m",
        until_years: 0.5,
        hr: (112.0, 136.5, 191.0),
        pr: (84.0, 106.0, 134.0),
        qrs: (50.0, 65.0, 85.0),
        qtc: (386.0, 420.0, 453.0),
        axis: (-6.0, 68.0, 108.0),
    },
    AgeReference {
        id: "6-12m",
        until_years: 1.0,
        hr: (106.0, 131.0, 194.0),
        pr: (82.0, 111.5, 141.0),
        qrs: (52.0, 66.5, 86.0),
        qtc: (379.0, 412.5, 449.0),
        axis: (1.0, 67.5, 122.0),
    },
    AgeReference {
        id: "1-3y",
        until_years: 3.0,
        hr: (95.0, 123.5, 178.0),
        pr: (78.0, 115.5, 151.0),
        qrs: (54.0, 69.5, 88.0),
        qtc: (381.0, 414.5, 455.0),
        axis: (-4.0, 66.5, 121.0),
    },
    AgeReference {
        id: "3-5y",
        until_years: 5.0,
        hr: (73.0, 99.5, 124.0),
        pr: (98.0, 122.0, 153.0),
        qrs: (58.0, 73.0, 92.0),
        qtc: (377.0, 413.5, 448.0),
        axis: (3.0, 69.5, 112.0),
    },
    AgeReference {
        id: "5-8y",
        until_years: 8.0,
        hr: (62.0, 88.5, 115.0),
        pr: (92.0, 126.5, 160.0),
        qrs: (59.0, 78.5, 98.0),
        qtc: (371.0, 410.0, 449.0),
        axis: (-10.0, 72.0, 117.0),
    },
    AgeReference {
        id: "8-12y",
        until_years: 12.0,
        hr: (55.0, 79.0, 110.0),
        pr: (103.0, 131.5, 174.0),
        qrs: (66.0, 83.5, 103.0),
        qtc: (365.0, 410.5, 447.0),
        axis: (-21.0, 68.0, 117.0),
    },
    AgeReference {
        id: "12-18y",
        until_years: 18.0,
        hr: (48.0, 74.5, 107.0),
        pr: (106.0, 137.0, 178.0),
        qrs: (72.0, 89.0, 111.0),
        qtc: (362.0, 410.5, 457.0),
        axis: (-9.0, 65.5, 112.0),
    },
    AgeReference {
        id: "18-40y",
        until_years: 40.0,
        hr: (48.0, 72.0, 96.0),
        pr: (100.0, 160.0, 220.0),
        qrs: (66.0, 90.0, 114.0),
        qtc: (370.0, 420.0, 470.0),
        axis: (-10.0, 50.0, 110.0),
    },
    AgeReference {
        id: "40y+",
        until_years: f64::INFINITY,
        hr: (46.0, 70.0, 94.0),
        pr: (101.0, 165.0, 229.0),
        qrs: (64.0, 92.0, 120.0),
        qtc: (369.0, 425.0, 481.0),
        axis: (-25.0, 45.0, 115.0),
    },
];

fn reference_for(age_years: f64) -> &'static AgeReference {
    AGE_REFERENCE
        .iter()
        .find(|r| age_years < r.until_years)
        .unwrap_or(&AGE_REFERENCE[AGE_REFERENCE.len() - 1])
}

/// Percentile by linear interpolation through (2, 50, 98), clamped to 0..100.
fn percentile_of(value: f64, (p2, p50, p98): Band) -> f64 {
    let pct = if value <= p50 {
        2.0 + 48.0 * (value - p2) / (p50 - p2)
    } else {
        50.0 + 48.0 * (value - p50) / (p98 - p50)
    };
    pct.clamp(0.0, 100.0)
}

fn reference_check(value: f64, band: Band) -> ReferenceCheck {
    let (p2, p50, p98) = band;
    let sd = (p98 - p2) / 4.0;
    ReferenceCheck {
        value,
        p2,
        p50,
        p98,
        z: if sd > 0.0 { (value - p50) / sd } else { 0.0 },
        percentile: percentile_of(value, band),
        within_normal: (p2..=p98).contains(&value),
    }
}

/// Place each present value against the reference for `age_years`.
pub fn age_normals(age_years: f64, values: &ClinicalValues) -> AgeNormals {
    let reference = reference_for(age_years);
    let mut checks = BTreeMap::new();
    for (name, value, band) in [
        ("HR_bpm", values.hr_bpm, reference.hr),
        ("PR_ms", values.pr_ms, reference.pr),
        ("QRS_ms", values.qrs_ms, reference.qrs),
        ("QTc_ms", values.qtc_ms, reference.qtc),
        ("QRS_axis_deg", values.qrs_axis_deg, reference.axis),
    ] {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            checks.insert(name.to_string(), reference_check(v, band));
        }
    }
    let outliers: Vec<String> = checks
        .iter()
        .filter(|(_, c)| !c.within_normal)
        .map(|(name, _)| name.clone())
        .collect();
    AgeNormals {
        age_years,
        age_bin: reference.id.to_string(),
        all_within_normal: outliers.is_empty(),
        checks,
        outliers,
    }
}

pub fn kurtosis(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = data.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / n;
    m4 / (m2 * m2)
}

fn std_dev(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    (data.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Lead II when present, otherwise the first lead.
fn analysis_lead(record: &EcgRecord) -> Option<&[f64]> {
    record
        .lead(Lead::II)
        .or_else(|| record.leads.values().next().map(Vec::as_slice))
        .filter(|samples| !samples.is_empty())
}

/// Amplitude of a sinusoid at `freq` by single-bin correlation.
fn tone_amplitude(data: &[f64], fs: f64, freq: f64) -> f64 {
    let w = 2.0 * std::f64::consts::PI * freq / fs;
    let (re, im) = data
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(re, im), (i, v)| {
            let phase = w * i as f64;
            (re + v * phase.cos(), im - v * phase.sin())
        });
    2.0 * (re * re + im * im).sqrt() / data.len() as f64
}

pub fn noise_metrics(data: &[f64], fs: f64) -> NoiseMetrics {
    // Two first-order stages for a second-order roll-off.
    let baseline = single_pole_lowpass(
        &single_pole_lowpass(data, fs, WANDER_CUTOFF_HZ),
        fs,
        WANDER_CUTOFF_HZ,
    );
    let baseline_wander_uv = std_dev(&baseline);
    let hf_noise_uv = (fs > 2.0 * HF_NOISE_CUTOFF_HZ).then(|| {
        std_dev(&single_pole_highpass(
            &single_pole_highpass(data, fs, HF_NOISE_CUTOFF_HZ),
            fs,
            HF_NOISE_CUTOFF_HZ,
        ))
    });

    let (freqs, powers) = welch(data, fs, (SPECTRUM_SEGMENT_S * fs) as usize);
    let total: f64 = powers.iter().sum();
    let powerline_hz = MAINS_HZ
        .iter()
        .copied()
        .filter(|&mains| mains < fs / 2.0)
        .filter_map(|mains| {
            let k = nearest_bin(&freqs, mains)?;
            if !(powers[k] > POWERLINE_MIN_SHARE * total) {
                return None;
            }
            let (lo, hi) = (k.checked_sub(2)?, k + 2);
            let neighbours = 0.5 * (powers.get(lo)? + powers.get(hi)?);
            let ratio = powers[k] / neighbours.max(f64::MIN_POSITIVE);
            (ratio > POWERLINE_PEAK_RATIO).then_some((mains, ratio))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(mains, _)| mains);
    let powerline_uv = powerline_hz.map(|mains| tone_amplitude(data, fs, mains));

    let noise_power = baseline_wander_uv.powi(2) + hf_noise_uv.unwrap_or(0.0).powi(2);
    let signal_power = std_dev(data).powi(2);
    let snr_db = (noise_power > 0.0 && signal_power > 0.0)
        .then(|| 10.0 * (signal_power / noise_power).log10());

    NoiseMetrics {
        baseline_wander_uv,
        hf_noise_uv,
        powerline_hz,
        powerline_uv,
        snr_db,
        kurtosis: kurtosis(data),
    }
}

fn nearest_bin(freqs: &[f64], target: f64) -> Option<usize> {
    (0..freqs.len()).min_by(|&a, &b| (freqs[a] - target).abs().total_cmp(&(freqs[b] - target).abs()))
}

/// `None` for a silent or too short signal.
pub fn spectral_metrics(data: &[f64], fs: f64) -> Option<SpectralMetrics> {
    let (freqs, powers) = welch(data, fs, (SPECTRUM_SEGMENT_S * fs) as usize);
    let total: f64 = powers.iter().sum();
    if freqs.is_empty() || !(total > 0.0) {
        return None;
    }
    let band = |lo: f64, hi: f64| -> f64 {
        100.0
            * freqs
                .iter()
                .zip(&powers)
                .filter(|(f, _)| (lo..hi).contains(*f))
                .map(|(_, p)| p)
                .sum::<f64>()
            / total
    };
    let qrs_band_pct = band(QRS_BAND_HZ.0, QRS_BAND_HZ.1);
    let powerline_pct: f64 = MAINS_HZ.iter().map(|&m| band(m - 1.0, m + 1.0)).sum();

    let bins = powers.iter().filter(|p| **p > 0.0).count();
    let entropy: f64 = powers
        .iter()
        .filter(|p| **p > 0.0)
        .map(|p| {
            let share = p / total;
            -share * share.log2()
        })
        .sum();
    let spectral_entropy = if bins > 1 { entropy / (bins as f64).log2() } else { 0.0 };

    Some(SpectralMetrics {
        wander_pct: band(0.0, WANDER_CUTOFF_HZ),
        qrs_band_pct,
        hf_pct: band(QRS_BAND_HZ.1, f64::INFINITY),
        powerline_pct,
        spectral_entropy,
        centroid_hz: freqs.iter().zip(&powers).map(|(f, p)| f * p).sum::<f64>() / total,
        qrs_band_plausible: qrs_band_pct > 15.0 && qrs_band_pct < 85.0,
    })
}

pub fn morphology_metrics(record: &EcgRecord) -> MorphologyMetrics {
    let precordial = [Lead::V1, Lead::V2, Lead::V3, Lead::V4, Lead::V5, Lead::V6];
    let extremes = |samples: &[f64]| {
        samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    };

    let flatline_leads = record
        .leads
        .iter()
        .filter(|(_, samples)| {
            let (lo, hi) = extremes(samples.as_slice());
            !(hi - lo >= FLATLINE_UV)
        })
        .map(|(lead, _)| *lead)
        .collect();

    let mut rs_ratios = BTreeMap::new();
    let mut dominant: Option<(Lead, f64)> = None;
    for lead in precordial {
        let Some(samples) = record.lead(lead).filter(|s| !s.is_empty()) else {
            continue;
        };
        let (lo, hi) = extremes(samples);
        let (r, s) = (hi.max(0.0), (-lo).max(0.0));
        let ratio = if s > MIN_S_UV { r / s } else if r > 10.0 * MIN_S_UV { f64::INFINITY } else { 1.0 };
        // JSON has no infinity; cap so the ratio still orders correctly.
        rs_ratios.insert(lead, ratio.min(1e6));
        if dominant.map_or(true, |(_, best)| r > best) {
            dominant = Some((lead, r));
        }
    }

    let present: Vec<(Lead, f64)> = rs_ratios.iter().map(|(l, r)| (*l, *r)).collect();
    let transition_zone = present
        .windows(2)
        .find(|w| w[0].1 < 1.0 && w[1].1 >= 1.0)
        .map(|w| format!("{}-{}", w[0].0, w[1].0));
    let rs_progression_ok = match (rs_ratios.get(&Lead::V1), rs_ratios.get(&Lead::V6)) {
        (Some(v1), Some(v6)) => Some(v6 > v1),
        _ => None,
    };

    MorphologyMetrics {
        rs_ratios,
        transition_zone,
        dominant_r_lead: dominant.map(|(lead, _)| lead),
        rs_progression_ok,
        flatline_leads,
    }
}

/// Quality of `record`. Age normals need targets (for the age) and are
/// computed from `values`, or from the targets themselves when `None`.
pub fn assess(record: &EcgRecord, values: Option<ClinicalValues>) -> QualityReport {
    let lead = analysis_lead(record);
    let noise = lead.map(|data| noise_metrics(data, record.fs));
    let spectrum = lead.and_then(|data| spectral_metrics(data, record.fs));
    let age_normals = record.targets.as_ref().map(|targets| {
        let values = values.unwrap_or_else(|| ClinicalValues::from_targets(targets));
        age_normals(targets.age_years, &values)
    });
    if let Some(n) = &age_normals {
        if !n.all_within_normal {
            debug!("outside the {} reference: {}", n.age_bin, n.outliers.join(", "));
        }
    }
    let morphology = morphology_metrics(record);
    let acceptable = noise.as_ref().is_some_and(|n| n.kurtosis >= MIN_KURTOSIS)
        && morphology.flatline_leads.is_empty();
    QualityReport {
        noise,
        spectrum,
        morphology,
        age_normals,
        acceptable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::LeadSet;
    use std::f64::consts::PI;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    fn record(leads: LeadSet, fs: f64) -> EcgRecord {
        let n = leads.values().map(Vec::len).min().unwrap_or(0);
        EcgRecord {
            fs,
            duration_s: n as f64 / fs,
            leads,
            targets: None,
            integrity: None,
        }
    }

    #[test]
    fn reference_bins_follow_age() {
        assert_eq!(reference_for(0.01).id, "0-1m");
        assert_eq!(reference_for(0.3).id, "3-6m");
        assert_eq!(reference_for(8.0).id, "8-12y");
        assert_eq!(reference_for(17.9).id, "12-18y");
        assert_eq!(reference_for(95.0).id, "40y+");
        // limits bracket the median in every bin
        for r in &AGE_REFERENCE {
            for (lo, mid, hi) in [r.hr, r.pr, r.qrs, r.qtc, r.axis] {
                assert!(lo < mid && mid < hi, "{}", r.id);
            }
        }
    }

    #[test]
    fn neonatal_rate_is_abnormal_in_an_adult() {
        let values = ClinicalValues {
            hr_bpm: Some(150.0),
            qrs_ms: Some(90.0),
            ..ClinicalValues::default()
        };
        let adult = age_normals(30.0, &values);
        assert_eq!(adult.age_bin, "18-40y");
        assert_eq!(adult.outliers, ["HR_bpm"]);
        assert!(!adult.all_within_normal);
        let hr = &adult.checks["HR_bpm"];
        assert_close(hr.z, (150.0 - 72.0) / 12.0, 1e-12);
        assert_eq!(hr.percentile, 100.0);
        assert!(!adult.checks.contains_key("PR_ms"));

        let neonate = age_normals(0.02, &values);
        assert!(neonate.checks["HR_bpm"].within_normal);
        assert!(neonate.outliers.contains(&"QRS_ms".to_string()));
    }

    #[test]
    fn percentile_interpolates_between_limits() {
        let band = (100.0, 140.0, 180.0);
        assert_close(percentile_of(140.0, band), 50.0, 1e-12);
        assert_close(percentile_of(100.0, band), 2.0, 1e-12);
        assert_close(percentile_of(160.0, band), 74.0, 1e-12);
        assert_eq!(percentile_of(10.0, band), 0.0);
    }

    #[test]
    fn mains_hum_and_wander_are_measured() {
        let fs = 500.0;
        let n = 10_000;
        let clean: Vec<f64> = (0..n)
            .map(|i| 300.0 * (2.0 * PI * 8.0 * i as f64 / fs).sin())
            .collect();
        let noisy: Vec<f64> = clean
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let t = i as f64 / fs;
                v + 40.0 * (2.0 * PI * 60.0 * t).sin() + 200.0 * (2.0 * PI * 0.2 * t).sin()
            })
            .collect();

        let quiet = noise_metrics(&clean, fs);
        assert!(quiet.powerline_hz.is_none());
        let loud = noise_metrics(&noisy, fs);
        assert_eq!(loud.powerline_hz, Some(60.0));
        assert_close(loud.powerline_uv.unwrap(), 40.0, 2.0);
        assert!(loud.baseline_wander_uv > 5.0 * quiet.baseline_wander_uv);
        assert!(loud.snr_db.unwrap() < quiet.snr_db.unwrap());
        assert!(loud.hf_noise_uv.is_some());
        assert!(noise_metrics(&clean, 150.0).hf_noise_uv.is_none());
    }

    #[test]
    fn band_shares_locate_the_energy() {
        let fs = 500.0;
        let tone: Vec<f64> = (0..10_000)
            .map(|i| 500.0 * (2.0 * PI * 12.0 * i as f64 / fs).sin())
            .collect();
        let s = spectral_metrics(&tone, fs).unwrap();
        assert!(s.qrs_band_pct > 99.0, "{}", s.qrs_band_pct);
        assert!(s.powerline_pct < 0.1);
        assert_close(s.centroid_hz, 12.0, 0.5);
        assert!(s.spectral_entropy < 0.2);
        assert!(!s.qrs_band_plausible);
        assert!(spectral_metrics(&vec![0.0; 4000], fs).is_none());
    }

    #[test]
    fn precordial_progression_and_flat_leads() {
        let beat = |r: f64, s: f64| -> Vec<f64> {
            (0..1000)
                .map(|i| match i % 500 {
                    100 => r,
                    110 => -s,
                    _ => 0.0,
                })
                .collect()
        };
        let mut leads = LeadSet::new();
        leads.insert(Lead::V1, beat(200.0, 900.0));
        leads.insert(Lead::V2, beat(400.0, 1000.0));
        leads.insert(Lead::V3, beat(700.0, 700.0));
        leads.insert(Lead::V4, beat(1200.0, 400.0));
        leads.insert(Lead::V5, beat(1500.0, 200.0));
        leads.insert(Lead::V6, beat(1100.0, 100.0));
        leads.insert(Lead::aVR, vec![2.0; 1000]);
        let m = morphology_metrics(&record(leads, 500.0));
        assert_eq!(m.rs_ratios.len(), 6);
        assert_close(m.rs_ratios[&Lead::V1], 200.0 / 900.0, 1e-12);
        assert_eq!(m.transition_zone.as_deref(), Some("V2-V3"));
        assert_eq!(m.dominant_r_lead, Some(Lead::V5));
        assert_eq!(m.rs_progression_ok, Some(true));
        assert_eq!(m.flatline_leads, [Lead::aVR]);
    }

    #[test]
    fn assess_uses_targets_for_age_normals() {
        let mut leads = LeadSet::new();
        leads.insert(
            Lead::II,
            (0..5000).map(|i| 100.0 * (2.0 * PI * 10.0 * i as f64 / 500.0).sin()).collect(),
        );
        let mut rec = record(leads, 500.0);
        assert!(assess(&rec, None).age_normals.is_none());

        rec.targets = Some(Targets {
            age_years: 6.0,
            hr_bpm: 90.0,
            pr_ms: Some(130.0),
            qrs_ms: 80.0,
            qtc_ms: 410.0,
            ..Targets::default()
        });
        let report = assess(&rec, None);
        assert!(report.noise.is_some());
        let normals = report.age_normals.unwrap();
        assert_eq!(normals.age_bin, "5-8y");
        assert_eq!(normals.checks.len(), 5);
        assert!(normals.all_within_normal, "{:?}", normals.outliers);

        let measured = ClinicalValues {
            hr_bpm: Some(200.0),
            ..ClinicalValues::default()
        };
        let normals = assess(&rec, Some(measured)).age_normals.unwrap();
        assert_eq!(normals.outliers, ["HR_bpm"]);
        let json = serde_json::to_value(&report.noise).unwrap();
        assert!(json["baseline_wander_uV"].is_number());
    }

    #[test]
    fn spiky_leads_are_acceptable_and_flat_ones_are_not() {
        let spikes: Vec<f64> = (0..4000).map(|i| if i % 400 == 200 { 1000.0 } else { 0.0 }).collect();
        let sine: Vec<f64> = (0..4000).map(|i| 300.0 * (2.0 * PI * i as f64 / 400.0).sin()).collect();
        assert!(kurtosis(&spikes) > 5.0);
        assert_close(kurtosis(&sine), 1.5, 0.01);
        assert_eq!(kurtosis(&[3.0; 8]), 0.0);

        let mut leads = LeadSet::new();
        leads.insert(Lead::II, spikes.clone());
        assert!(assess(&record(leads.clone(), 500.0), None).acceptable);
        leads.insert(Lead::V1, vec![0.0; 4000]);
        assert!(!assess(&record(leads, 500.0), None).acceptable);

        let mut leads = LeadSet::new();
        leads.insert(Lead::II, sine);
        assert!(!assess(&record(leads, 500.0), None).acceptable);
    }
}
