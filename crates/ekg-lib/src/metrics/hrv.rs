use crate::dsp::welch;
use crate::record::null_as_default;
use crate::signal::RRSeries;
use serde::{Deserialize, Serialize};

/// Time-domain HRV in the units it is computed in (seconds, fraction).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

/// HRV block of the record schema: milliseconds and percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvSummary {
    #[serde(rename = "meanRR", default, deserialize_with = "null_as_default")]
    pub mean_rr_ms: f64,
    #[serde(rename = "SDNN", default, deserialize_with = "null_as_default")]
    pub sdnn_ms: f64,
    #[serde(rename = "RMSSD", default, deserialize_with = "null_as_default")]
    pub rmssd_ms: f64,
    #[serde(rename = "pNN50", default, deserialize_with = "null_as_default")]
    pub pnn50_pct: f64,
}

impl From<HRVTime> for HrvSummary {
    fn from(t: HRVTime) -> Self {
        Self {
            mean_rr_ms: t.avnn * 1000.0,
            sdnn_ms: t.sdnn * 1000.0,
            rmssd_ms: t.rmssd * 1000.0,
            pnn50_pct: t.pnn50 * 100.0,
        }
    }
}

/// Frequency-domain HRV of an RR tachogram (powers in ms²).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HRVPsd {
    pub vlf: f64,
    pub lf: f64,
    pub hf: f64,
    pub lf_hf: f64,
    pub total_power: f64,
    /// `[frequency Hz, power ms²]` per Welch bin.
    pub points: Vec<[f64; 2]>,
}

/// Half-open `[lo, hi)` bands in Hz.
const VLF_BAND: (f64, f64) = (0.003, 0.04);
const LF_BAND: (f64, f64) = (0.04, 0.15);
const HF_BAND: (f64, f64) = (0.15, 0.40);

/// Welch segment length; long enough to resolve the LF band.
const SEGMENT_S: f64 = 30.0;

pub fn hrv_time(rr: &RRSeries) -> HRVTime {
    hrv_time_segments(std::slice::from_ref(rr))
}

/// Time-domain HRV over NN runs.
///
/// Each segment is a run of consecutive normal-to-normal intervals. SDNN and
/// the mean pool every interval; successive differences (RMSSD, pNN50) are
/// only taken inside a segment, never across the gap an ectopic beat leaves.
pub fn hrv_time_segments(segments: &[RRSeries]) -> HRVTime {
    let all: Vec<f64> = segments.iter().flat_map(|s| s.rr.iter().copied()).collect();
    let n = all.len();
    let diffs: Vec<f64> = segments
        .iter()
        .flat_map(|s| s.rr.windows(2).map(|w| w[1] - w[0]).collect::<Vec<_>>())
        .collect();
    if n < 2 || diffs.is_empty() {
        return HRVTime {
            n,
            ..HRVTime::default()
        };
    }

    let avnn = all.iter().sum::<f64>() / n as f64;
    let sdnn = (all.iter().map(|x| (x - avnn).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt();
    let rmssd = (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt();
    let count = diffs.iter().filter(|d| d.abs() > 0.050).count();
    let pnn50 = count as f64 / diffs.len() as f64;

    HRVTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}

/// Welch PSD of `rr`, resampled on a uniform grid at `fs_interp` Hz.
pub fn hrv_psd(rr: &RRSeries, fs_interp: f64) -> HRVPsd {
    let tachogram = resample_tachogram(rr, fs_interp);
    let (freqs, powers) = welch(&tachogram, fs_interp, (fs_interp * SEGMENT_S) as usize);
    let band = |(lo, hi): (f64, f64)| -> f64 {
        freqs
            .iter()
            .zip(&powers)
            .filter(|(f, _)| (lo..hi).contains(*f))
            .map(|(_, p)| p)
            .sum()
    };
    let (vlf, lf, hf) = (band(VLF_BAND), band(LF_BAND), band(HF_BAND));
    HRVPsd {
        vlf,
        lf,
        hf,
        lf_hf: if hf > 0.0 { lf / hf } else { 0.0 },
        total_power: powers.iter().sum(),
        points: freqs.iter().zip(&powers).map(|(&f, &p)| [f, p]).collect(),
    }
}

/// RR (ms) at each beat time, linearly interpolated onto `fs` Hz and
/// mean-removed. Before the first beat the first interval is held.
fn resample_tachogram(rr: &RRSeries, fs: f64) -> Vec<f64> {
    if rr.rr.len() < 2 || !(fs > 0.0) {
        return Vec::new();
    }
    let beat_times: Vec<f64> = rr
        .rr
        .iter()
        .scan(0.0, |t, &interval| {
            *t += interval;
            Some(*t)
        })
        .collect();
    let end = beat_times[beat_times.len() - 1];
    let mut out = Vec::with_capacity((end * fs) as usize + 1);
    let mut k = 0;
    let mut t = 0.0;
    while t <= end {
        while k + 1 < beat_times.len() && beat_times[k + 1] < t {
            k += 1;
        }
        let value = if t <= beat_times[0] {
            rr.rr[0]
        } else {
            let (t0, t1) = (beat_times[k], beat_times[(k + 1).min(beat_times.len() - 1)]);
            let (v0, v1) = (rr.rr[k], rr.rr[(k + 1).min(rr.rr.len() - 1)]);
            if t1 > t0 {
                v0 + (v1 - v0) * (t - t0) / (t1 - t0)
            } else {
                v0
            }
        };
        out.push(value * 1000.0);
        t = out.len() as f64 / fs;
    }
    // DC leakage through the Hann window would otherwise swamp the VLF band.
    let mean = out.iter().sum::<f64>() / out.len() as f64;
    out.iter_mut().for_each(|v| *v -= mean);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn time_domain_matches_hand_computation() {
        let rr = RRSeries {
            rr: vec![0.8, 0.9, 0.7, 0.8],
        };
        let t = hrv_time(&rr);
        assert_eq!(t.n, 4);
        assert_close(t.avnn, 0.8, 1e-12);
        // sample variance: (0 + 0.01 + 0.01 + 0) / 3
        assert_close(t.sdnn, (0.02f64 / 3.0).sqrt(), 1e-12);
        // diffs 0.1, -0.2, 0.1
        assert_close(t.rmssd, (0.06f64 / 3.0).sqrt(), 1e-12);
        assert_close(t.pnn50, 1.0, 1e-12);
        let summary = HrvSummary::from(t);
        assert_close(summary.mean_rr_ms, 800.0, 1e-9);
        assert_close(summary.pnn50_pct, 100.0, 1e-9);
    }

    #[test]
    fn successive_differences_do_not_cross_segments() {
        let joined = RRSeries {
            rr: vec![0.8, 0.8, 1.2, 1.2],
        };
        let split = [
            RRSeries { rr: vec![0.8, 0.8] },
            RRSeries { rr: vec![1.2, 1.2] },
        ];
        assert!(hrv_time(&joined).rmssd > 0.0);
        assert_close(hrv_time_segments(&split).rmssd, 0.0, 1e-12);
        assert_close(hrv_time_segments(&split).avnn, 1.0, 1e-12);
    }

    #[test]
    fn too_few_intervals_yield_zeros() {
        let t = hrv_time(&RRSeries { rr: vec![0.8] });
        assert_eq!(t.n, 1);
        assert_eq!(t.sdnn, 0.0);
        assert_eq!(t.rmssd, 0.0);
        assert_eq!(t.avnn, 0.0);
    }

    #[test]
    fn psd_locates_respiratory_modulation_in_hf_band() {
        // 0.3 Hz modulation sampled beat by beat.
        let mut rr = Vec::new();
        let mut t = 0.0;
        while t < 180.0 {
            let interval = 0.85 + 0.04 * (2.0 * PI * 0.3 * t).sin();
            rr.push(interval);
            t += interval;
        }
        let psd = hrv_psd(&RRSeries { rr }, 4.0);
        assert!(psd.points.len() > 10);
        assert!(psd.hf > 5.0 * psd.lf, "hf {} lf {}", psd.hf, psd.lf);
        assert!(psd.hf > 5.0 * psd.vlf, "hf {} vlf {}", psd.hf, psd.vlf);
    }
}
