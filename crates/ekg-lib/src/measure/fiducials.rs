//! Fiducial landmarks on the median beat.
//!
//! All positions in a [`FiducialSet`] are sample offsets relative to the
//! median beat's R-peak, so they transfer directly onto every detected beat.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::measure::median::MedianBeat;
use crate::record::Lead;
use crate::signal::Events;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiducialConfig {
    /// Span of the difference used for slopes (seconds).
    pub slope_span_s: f64,
    /// QRS boundary: composite slope below this fraction of its QRS maximum.
    pub qrs_threshold: f64,
    /// How long the slope must stay below threshold (seconds).
    pub sustain_s: f64,
    /// Half-width of the region searched for the QRS slope maximum (seconds).
    pub qrs_search_s: f64,
    /// P boundary: slope below this fraction of the pre-QRS slope maximum.
    pub p_threshold: f64,
    /// Smaller pre-QRS deflections are treated as "no P wave".
    pub p_min_amplitude_uv: f64,
    /// Longest stretch before QRS onset searched for a P wave (seconds).
    pub p_window_max_s: f64,
    pub p_window_rr_fraction: f64,
    /// Gap after QRS offset before the T search starts (seconds).
    pub t_gap_s: f64,
    /// Smaller repolarisation waves get no T end.
    pub t_min_amplitude_uv: f64,
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            slope_span_s: 0.004,
            qrs_threshold: 0.05,
            sustain_s: 0.006,
            qrs_search_s: 0.15,
            p_threshold: 0.10,
            p_min_amplitude_uv: 30.0,
            p_window_max_s: 0.30,
            p_window_rr_fraction: 0.35,
            t_gap_s: 0.04,
            t_min_amplitude_uv: 20.0,
        }
    }
}

/// Landmarks relative to the R-peak, in samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiducialSet {
    pub fs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_on: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_off: Option<i64>,
    pub qrs_on: i64,
    pub qrs_off: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_end: Option<i64>,
    /// Lead the T end was measured on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_lead: Option<Lead>,
    /// Isoelectric level per lead, taken at QRS onset.
    #[serde(rename = "baseline_uV")]
    pub baseline: BTreeMap<Lead, f64>,
}

impl FiducialSet {
    pub fn ms(&self, samples: i64) -> f64 {
        samples as f64 * 1000.0 / self.fs
    }

    pub fn pr_samples(&self) -> Option<i64> {
        self.p_on.map(|p| self.qrs_on - p)
    }

    pub fn qrs_samples(&self) -> i64 {
        self.qrs_off - self.qrs_on
    }

    pub fn qt_samples(&self) -> Option<i64> {
        self.t_end.map(|t| t - self.qrs_on)
    }
}

/// Absolute sample positions for one detected beat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeatFiducials {
    pub r_peak: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p_on: Option<i64>,
    pub qrs_on: i64,
    pub qrs_off: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t_end: Option<i64>,
}

/// Transfer the median-beat landmarks onto every R-peak.
pub fn per_beat(set: &FiducialSet, r_peaks: &Events) -> Vec<BeatFiducials> {
    r_peaks
        .indices
        .iter()
        .map(|&r| {
            let at = |rel: i64| r as i64 + rel;
            BeatFiducials {
                r_peak: r,
                p_on: set.p_on.map(at),
                qrs_on: at(set.qrs_on),
                qrs_off: at(set.qrs_off),
                t_end: set.t_end.map(at),
            }
        })
        .collect()
}

/// Composite backward slope Σ|x[k] − x[k−s]| (zero for k < s).
fn backward_slope(leads: &[&[f64]], n: usize, s: usize) -> Vec<f64> {
    (0..n)
        .map(|k| {
            if k < s {
                0.0
            } else {
                leads.iter().map(|x| (x[k] - x[k - s]).abs()).sum()
            }
        })
        .collect()
}

/// Composite forward slope Σ|x[k+s] − x[k]| (zero where k + s is past the end).
fn forward_slope(leads: &[&[f64]], n: usize, s: usize) -> Vec<f64> {
    (0..n)
        .map(|k| {
            if k + s >= n {
                0.0
            } else {
                leads.iter().map(|x| (x[k + s] - x[k]).abs()).sum()
            }
        })
        .collect()
}

fn argmax(values: &[f64], (start, end): (usize, usize)) -> Option<(usize, f64)> {
    (start..=end.min(values.len().checked_sub(1)?))
        .map(|k| (k, values[k]))
        .fold(None, |best, (k, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((k, v)),
        })
}

/// Walk backward from `from` to the first sample that starts a quiet run of
/// `run` samples (the run extends further back). Stops at `limit`.
fn quiet_before(slope: &[f64], from: usize, limit: usize, threshold: f64, run: usize) -> usize {
    let mut k = from;
    while k > limit {
        let first = k.saturating_sub(run - 1).max(limit);
        if k - first + 1 >= run && slope[first..=k].iter().all(|&v| v < threshold) {
            return k;
        }
        k -= 1;
    }
    limit
}

/// Walk forward from `from` to the first sample that starts a quiet run of
/// `run` samples. Stops at `limit`.
fn quiet_after(slope: &[f64], from: usize, limit: usize, threshold: f64, run: usize) -> usize {
    let mut k = from;
    while k < limit {
        let last = (k + run - 1).min(limit);
        if last - k + 1 >= run && slope[k..=last].iter().all(|&v| v < threshold) {
            return k;
        }
        k += 1;
    }
    limit
}

/// Slope-threshold boundaries of the wave inside `region`.
fn boundaries(
    backward: &[f64],
    forward: &[f64],
    region: (usize, usize),
    fraction: f64,
    run: usize,
) -> Option<(usize, usize)> {
    let (on_peak, on_max) = argmax(backward, region)?;
    let (off_peak, off_max) = argmax(forward, region)?;
    if on_max <= 0.0 || off_max <= 0.0 {
        return None;
    }
    let onset = quiet_before(backward, on_peak, region.0, fraction * on_max, run);
    let offset = quiet_after(forward, off_peak, region.1, fraction * off_max, run);
    (offset > onset).then_some((onset, offset))
}

/// Tangent-method T end on the lead with the largest T wave.
fn t_end(
    beat: &MedianBeat,
    baseline: &BTreeMap<Lead, f64>,
    region: (usize, usize),
    s: usize,
    min_amplitude: f64,
) -> Option<(usize, Lead)> {
    let (start, end) = region;
    if end <= start + 2 * s {
        return None;
    }
    let (lead, peak, amplitude) = beat
        .leads
        .iter()
        .filter_map(|(lead, x)| {
            let base = baseline.get(lead).copied().unwrap_or(0.0);
            let (k, dev) = (start..=end)
                .map(|k| (k, x[k] - base))
                .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))?;
            Some((*lead, k, dev))
        })
        .max_by(|a, b| a.2.abs().total_cmp(&b.2.abs()))?;
    if amplitude.abs() < min_amplitude {
        return None;
    }

    let x = &beat.leads[&lead];
    let base = baseline.get(&lead).copied().unwrap_or(0.0);
    let sign = amplitude.signum();
    // steepest return toward baseline after the peak
    let mut best: Option<(usize, f64)> = None;
    for k in peak.max(s)..=end.min(x.len() - 1 - s) {
        let slope = (x[k + s] - x[k - s]) / (2 * s) as f64;
        let descent = -sign * slope;
        if descent > 0.0 && best.map_or(true, |(_, b)| descent > b) {
            best = Some((k, descent));
        }
    }
    let (k, descent) = best?;
    let slope = -sign * descent;
    let intercept = k as f64 + (base - x[k]) / slope;
    if !intercept.is_finite() || intercept < peak as f64 || intercept >= x.len() as f64 {
        return None;
    }
    Some((intercept.round() as usize, lead))
}

/// Locate P, QRS and T landmarks on a median beat.
///
/// Returns `None` when the median beat failed or no QRS boundary can be
/// found. P landmarks are `None` when the pre-QRS region holds no
/// deflection; T end is `None` when the tangent does not reach baseline
/// inside the beat.
pub fn extract_fiducials(beat: &MedianBeat, mean_rr_s: f64, cfg: &FiducialConfig) -> Option<FiducialSet> {
    if !beat.ok || beat.leads.is_empty() {
        return None;
    }
    let fs = beat.fs;
    let n = beat.leads.values().map(Vec::len).min()?;
    let r = beat.r_index;
    if n == 0 || r >= n {
        return None;
    }
    let s = ((cfg.slope_span_s * fs).round() as usize).max(1);
    let run = ((cfg.sustain_s * fs).round() as usize).max(2);
    let secs = |t: f64| (t * fs).round().max(0.0) as usize;

    let leads: Vec<&[f64]> = beat.leads.values().map(|v| &v[..n]).collect();
    let backward = backward_slope(&leads, n, s);
    let forward = forward_slope(&leads, n, s);

    let qrs_region = (r.saturating_sub(secs(cfg.qrs_search_s)), (r + secs(cfg.qrs_search_s)).min(n - 1));
    let (qrs_on, qrs_off) = boundaries(&backward, &forward, qrs_region, cfg.qrs_threshold, run)?;

    let baseline: BTreeMap<Lead, f64> = beat
        .leads
        .iter()
        .map(|(lead, x)| (*lead, x[qrs_on]))
        .collect();

    let rr = if mean_rr_s > 0.0 { mean_rr_s } else { beat.dominant_rr_s };
    let t_region = (
        qrs_off + secs(cfg.t_gap_s),
        (r + secs(rr - 0.1)).min(n - 1),
    );
    let t = t_end(beat, &baseline, t_region, s, cfg.t_min_amplitude_uv)
        .filter(|(t, _)| (*t as f64 - qrs_on as f64) < rr * fs);

    let p_region = (
        qrs_on.saturating_sub(secs(cfg.p_window_max_s.min(cfg.p_window_rr_fraction * rr))),
        qrs_on.saturating_sub(s),
    );
    let p_amplitude = beat
        .leads
        .iter()
        .filter(|_| p_region.1 > p_region.0)
        .flat_map(|(lead, x)| {
            let base = baseline[lead];
            x[p_region.0..=p_region.1].iter().map(move |v| (v - base).abs())
        })
        .fold(0.0, f64::max);
    let p = if p_amplitude >= cfg.p_min_amplitude_uv {
        boundaries(&backward, &forward, p_region, cfg.p_threshold, run)
            .filter(|&(on, off)| on > p_region.0 && off < qrs_on)
    } else {
        None
    };

    let rel = |k: usize| k as i64 - r as i64;
    let set = FiducialSet {
        fs,
        p_on: p.map(|(on, _)| rel(on)),
        p_off: p.map(|(_, off)| rel(off)),
        qrs_on: rel(qrs_on),
        qrs_off: rel(qrs_off),
        t_end: t.map(|(t, _)| rel(t)),
        t_lead: t.map(|(_, lead)| lead),
        baseline,
    };
    debug!(
        "fiducials: P {:?}/{:?}, QRS {}..{}, T end {:?} on {:?}",
        set.p_on, set.p_off, set.qrs_on, set.qrs_off, set.t_end, set.t_lead
    );
    Some(set)
}
