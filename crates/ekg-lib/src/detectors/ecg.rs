use crate::{
    dsp::{bandpass, derivative, median, moving_average, percentile, square},
    record::EcgRecord,
    signal::{Events, TimeSeries},
};
use log::debug;
use serde::{Deserialize, Serialize};

/// Configurable parameters for the multi-lead R-peak detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Detection threshold as a fraction of the envelope percentile below.
    pub threshold_fraction: f64,
    pub threshold_percentile: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub refractory_s: f64,
    /// How far back from an envelope maximum to look for the R-peak (seconds).
    pub search_back_s: f64,
    /// How far forward from an envelope maximum to look (seconds).
    pub search_forward_s: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            threshold_fraction: 0.3,
            threshold_percentile: 98.0,
            refractory_s: 0.200,
            search_back_s: 0.200,
            search_forward_s: 0.020,
        }
    }
}

/// Single-lead detection with a minimal configuration surface.
pub fn detect_r_peaks(ts: &TimeSeries, min_rr_s: f64) -> Events {
    let cfg = DetectorConfig {
        refractory_s: min_rr_s.max(0.15),
        ..DetectorConfig::default()
    };
    detect_r_peaks_multi(&[ts.data.as_slice()], ts.fs, &cfg)
}

/// Detect R-peaks over every lead of a record.
pub fn detect_record(record: &EcgRecord, cfg: &DetectorConfig) -> Events {
    let leads: Vec<&[f64]> = record.leads.values().map(Vec::as_slice).collect();
    detect_r_peaks_multi(&leads, record.fs, cfg)
}

/// Pan–Tompkins style detection on several simultaneous leads.
///
/// Each lead is band-passed, differentiated and squared; the energies are
/// summed and integrated. Every contiguous supra-threshold region yields one
/// candidate, refined onto the largest deviation from the local median on
/// the reference lead (largest band-passed range). Output is strictly
/// increasing.
pub fn detect_r_peaks_multi(leads: &[&[f64]], fs: f64, cfg: &DetectorConfig) -> Events {
    let n = leads.iter().map(|l| l.len()).min().unwrap_or(0);
    if n == 0 || fs.is_nan() || fs <= 0.0 {
        return Events::default();
    }

    let (reference, integrated) = multi_lead_envelope(leads, n, fs, cfg);
    let Some(level) = percentile(&integrated, cfg.threshold_percentile) else {
        return Events::default();
    };
    let threshold = cfg.threshold_fraction * level;
    if threshold <= 0.0 {
        return Events::default();
    }

    let candidates = region_maxima(&integrated, threshold);
    let lead = leads[reference];
    // One polarity for the whole record, so biphasic complexes are always
    // anchored on the same deflection.
    let polarity = if candidates
        .iter()
        .map(|&c| deviation(lead, search_window(lead, c, fs, cfg), None).1)
        .sum::<f64>()
        < 0.0
    {
        -1.0
    } else {
        1.0
    };
    let refined: Vec<(usize, f64)> = candidates
        .iter()
        .map(|&c| {
            let (idx, _) = deviation(lead, search_window(lead, c, fs, cfg), Some(polarity));
            (idx, integrated[c])
        })
        .collect();
    let peaks = enforce_refractory(refined, (cfg.refractory_s * fs).round().max(1.0) as usize);
    debug!(
        "detector: {} candidates, {} peaks, reference lead #{reference}",
        candidates.len(),
        peaks.len()
    );
    Events::from_indices(peaks)
}

fn multi_lead_envelope(leads: &[&[f64]], n: usize, fs: f64, cfg: &DetectorConfig) -> (usize, Vec<f64>) {
    let mut energy = vec![0.0; n];
    let mut reference = 0;
    let mut best_range = f64::MIN;
    for (k, lead) in leads.iter().enumerate() {
        let bandpassed = bandpass(&lead[..n], fs, cfg.lowcut_hz, cfg.highcut_hz);
        let (lo, hi) = bandpassed
            .iter()
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if hi - lo > best_range {
            best_range = hi - lo;
            reference = k;
        }
        for (e, s) in energy.iter_mut().zip(square(&derivative(&bandpassed))) {
            *e += s;
        }
    }
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    (reference, moving_average(&energy, win))
}

/// Index of the maximum inside each contiguous run above `threshold`.
fn region_maxima(envelope: &[f64], threshold: f64) -> Vec<usize> {
    let mut out = Vec::new();
    let mut best: Option<usize> = None;
    for (i, &v) in envelope.iter().enumerate() {
        if v > threshold {
            match best {
                Some(b) if envelope[b] >= v => {}
                _ => best = Some(i),
            }
        } else if let Some(b) = best.take() {
            out.push(b);
        }
    }
    if let Some(b) = best {
        out.push(b);
    }
    out
}

fn search_window(lead: &[f64], candidate: usize, fs: f64, cfg: &DetectorConfig) -> (usize, usize) {
    let start = candidate.saturating_sub((cfg.search_back_s * fs).round() as usize);
    let end = (candidate + (cfg.search_forward_s * fs).round() as usize).min(lead.len() - 1);
    (start, end)
}

/// Largest deviation from the window median: absolute when `polarity` is
/// `None`, otherwise signed. Returns the index and the signed deviation.
fn deviation(lead: &[f64], (start, end): (usize, usize), polarity: Option<f64>) -> (usize, f64) {
    let window = &lead[start..=end];
    let centre = median(window).unwrap_or(0.0);
    let mut idx = start;
    let mut best = f64::MIN;
    let mut signed = 0.0;
    for (j, &v) in window.iter().enumerate() {
        let dev = v - centre;
        let score = match polarity {
            Some(sign) => sign * dev,
            None => dev.abs(),
        };
        if score > best {
            best = score;
            signed = dev;
            idx = start + j;
        }
    }
    (idx, signed)
}

/// Keep the stronger of any two peaks closer than `refractory` samples.
fn enforce_refractory(mut peaks: Vec<(usize, f64)>, refractory: usize) -> Vec<usize> {
    peaks.sort_by_key(|p| p.0);
    let mut kept: Vec<(usize, f64)> = Vec::with_capacity(peaks.len());
    for peak in peaks {
        match kept.last_mut() {
            Some(last) if peak.0 - last.0 < refractory => {
                if peak.1 > last.1 {
                    *last = peak;
                }
            }
            _ => kept.push(peak),
        }
    }
    let mut out: Vec<usize> = kept.into_iter().map(|p| p.0).collect();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let ts = synthetic_timeseries(fs, &rr, 1.2);
        let events = detect_r_peaks(&ts, 0.3);
        assert_eq!(events.indices.len(), rr.len() + 1);
    }

    #[test]
    fn peaks_land_on_the_beats() {
        let fs = 500.0;
        let rr = [0.6, 0.62, 0.58, 0.6, 0.61];
        let ts = synthetic_timeseries(fs, &rr, 1.0);
        let events = detect_r_peaks(&ts, 0.25);
        let mut t = 0.5;
        let mut expected = vec![t];
        for interval in rr {
            t += interval;
            expected.push(t);
        }
        assert_eq!(events.len(), expected.len());
        for (idx, bt) in events.indices.iter().zip(expected) {
            assert!((*idx as f64 / fs - bt).abs() <= 0.004, "{idx} vs {bt}");
        }
    }

    #[test]
    fn record_detection_spans_every_lead() {
        let fs = 250.0;
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let ts = synthetic_timeseries(fs, &rr, 1.2);
        let mut record = EcgRecord {
            fs,
            duration_s: ts.duration(),
            leads: Default::default(),
            targets: None,
            integrity: None,
        };
        record.leads.insert(crate::record::Lead::II, ts.data.clone());
        record
            .leads
            .insert(crate::record::Lead::I, ts.data.iter().map(|v| 0.4 * v).collect());
        let events = detect_record(&record, &DetectorConfig::default());
        assert_eq!(events.len(), rr.len() + 1);
        let rr_detected = crate::signal::RRSeries::from_events(&events, fs);
        for (got, want) in rr_detected.rr.iter().zip(rr) {
            assert!((got - want).abs() <= 0.008, "{got} vs {want}");
        }
    }

    #[test]
    fn inverted_and_weak_leads_still_detect() {
        let fs = 500.0;
        let rr = [0.7; 10];
        let strong = synthetic_timeseries(fs, &rr, -1.5);
        let weak = synthetic_timeseries(fs, &rr, 0.1);
        let events = detect_r_peaks_multi(
            &[strong.data.as_slice(), weak.data.as_slice()],
            fs,
            &DetectorConfig::default(),
        );
        assert_eq!(events.len(), rr.len() + 1);
        assert!(events.indices.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn flat_input_has_no_peaks() {
        let events = detect_r_peaks_multi(&[&[0.0; 1000][..]], 500.0, &DetectorConfig::default());
        assert!(events.is_empty());
        assert!(detect_r_peaks_multi(&[], 500.0, &DetectorConfig::default()).is_empty());
    }

    #[test]
    fn refractory_keeps_the_stronger_peak() {
        let kept = enforce_refractory(vec![(100, 1.0), (130, 5.0), (400, 2.0)], 50);
        assert_eq!(kept, vec![130, 400]);
    }

    fn synthetic_timeseries(fs: f64, rr: &[f64], amplitude: f64) -> TimeSeries {
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs) as usize;
        let mut data = Vec::with_capacity(samples);
        for i in 0..samples {
            let time = i as f64 / fs;
            let mut v = 0.05 * (2.0 * PI * 1.0 * time).sin();
            for &bt in &beats {
                let width = 0.02;
                let amp = (-0.5 * ((time - bt) / width).powi(2)).exp();
                v += amplitude * amp;
            }
            data.push(v);
        }
        TimeSeries { fs, data }
    }
}
