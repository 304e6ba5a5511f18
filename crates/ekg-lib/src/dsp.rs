//! First-order filters, Welch spectra and the small signal helpers shared
//! by the device model, the detectors and the quality metrics.

use realfft::RealFftPlanner;
use std::f64::consts::PI;

/// High-pass then low-pass; either stage is skipped when its cutoff is
/// non-positive, and the low-pass also when it is at or above Nyquist.
pub fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

pub fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev_y = 0.0;
    let mut prev_x = data[0];
    for &x in data {
        let y = alpha * (prev_y + x - prev_x);
        out.push(y);
        prev_y = y;
        prev_x = x;
    }
    out
}

pub fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}

pub fn derivative(data: &[f64]) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

pub fn square(data: &[f64]) -> Vec<f64> {
    data.iter().map(|x| x * x).collect()
}

/// Trailing moving average over `win` samples.
pub fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

/// Median of a slice; `None` when empty.
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Linear-interpolated percentile, `q` in [0, 100].
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let w = rank - lo as f64;
    Some(sorted[lo] * (1.0 - w) + sorted[hi] * w)
}

/// One-sided Welch estimate with Hann windows of `window` samples (clamped
/// to the signal) and 50 % overlap. Returns bin frequencies and powers.
pub fn welch(signal: &[f64], fs: f64, window: usize) -> (Vec<f64>, Vec<f64>) {
    let n = signal.len();
    if n < 4 {
        return (Vec::new(), Vec::new());
    }
    let window = window.clamp(4, n);
    let hop = (window / 2).max(1);
    let taper: Vec<f64> = (0..window)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f64 / window as f64).cos()))
        .collect();

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(window);
    let mut spectrum = fft.make_output_vec();
    let mut powers = vec![0.0; spectrum.len()];
    let mut segments = 0usize;
    for start in (0..=n - window).step_by(hop) {
        let mut frame: Vec<f64> = signal[start..start + window]
            .iter()
            .zip(&taper)
            .map(|(x, w)| x * w)
            .collect();
        if fft.process(&mut frame, &mut spectrum).is_err() {
            break;
        }
        let nyquist = (window % 2 == 0).then_some(window / 2);
        for (k, bin) in spectrum.iter().enumerate() {
            let fold = if k == 0 || Some(k) == nyquist { 1.0 } else { 2.0 };
            powers[k] += fold * bin.norm_sqr() / window as f64;
        }
        segments += 1;
    }
    if segments == 0 {
        return (Vec::new(), Vec::new());
    }
    powers.iter_mut().for_each(|p| *p /= segments as f64);
    let freqs = (0..powers.len()).map(|k| k as f64 * fs / window as f64).collect();
    (freqs, powers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff <= tol,
            "expected {expected}, got {actual} (diff {diff} > tol {tol})"
        );
    }

    #[test]
    fn highpass_removes_offset() {
        let data = vec![500.0; 5000];
        let out = single_pole_highpass(&data, 500.0, 0.5);
        assert_close(out[0], 0.0, 1e-12);
        assert!(out.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn lowpass_passes_dc() {
        let data = vec![42.0; 1000];
        let out = single_pole_lowpass(&data, 1000.0, 40.0);
        assert_close(out[999], 42.0, 1e-9);
    }

    #[test]
    fn bandpass_skips_lowpass_above_nyquist() {
        let data: Vec<f64> = (0..100).map(|i| (i % 2) as f64).collect();
        let direct = single_pole_highpass(&data, 200.0, 1.0);
        assert_eq!(bandpass(&data, 200.0, 1.0, 150.0), direct);
    }

    #[test]
    fn moving_average_is_trailing() {
        let out = moving_average(&[3.0, 3.0, 3.0, 9.0], 2);
        assert_eq!(out, vec![1.5, 3.0, 3.0, 6.0]);
    }

    #[test]
    fn percentile_interpolates() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_close(percentile(&[0.0, 10.0], 98.0).unwrap(), 9.8, 1e-12);
        assert!(median(&[]).is_none());
    }

    #[test]
    fn welch_peaks_at_the_tone() {
        let fs = 500.0;
        let tone: Vec<f64> = (0..5000)
            .map(|i| 100.0 * (2.0 * PI * 50.0 * i as f64 / fs).sin())
            .collect();
        let (freqs, powers) = welch(&tone, fs, 2000);
        assert_eq!(freqs.len(), 1001);
        let peak = (0..powers.len())
            .max_by(|&a, &b| powers[a].total_cmp(&powers[b]))
            .unwrap();
        assert_close(freqs[peak], 50.0, 1e-9);
        assert!(welch(&[1.0, 2.0], fs, 2000).0.is_empty());
    }
}
