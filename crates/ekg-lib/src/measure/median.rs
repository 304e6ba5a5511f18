//! Representative (median) beat built from aligned R-peak windows.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dsp::median;
use crate::record::{EcgRecord, LeadSet};
use crate::signal::{Events, RRSeries};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MedianConfig {
    /// Window before R as a fraction of the dominant RR.
    pub pre_fraction: f64,
    /// Window after R as a fraction of the dominant RR.
    pub post_fraction: f64,
    pub min_pre_s: f64,
    pub min_post_s: f64,
    /// Beats whose neighbouring RR differs from the dominant RR by more
    /// than this fraction are left out of the template.
    pub rr_tolerance: f64,
    pub min_beats: usize,
}

impl Default for MedianConfig {
    fn default() -> Self {
        Self {
            pre_fraction: 0.25,
            post_fraction: 0.55,
            min_pre_s: 0.24,
            min_post_s: 0.30,
            rr_tolerance: 0.2,
            min_beats: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedianBeat {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub fs: f64,
    /// Index of the R-peak inside the window.
    pub r_index: usize,
    pub pre_samples: usize,
    pub post_samples: usize,
    pub dominant_rr_s: f64,
    pub beats_used: usize,
    #[serde(rename = "leads_uV")]
    pub leads: LeadSet,
}

impl MedianBeat {
    fn failed(fs: f64, dominant_rr_s: f64, reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
            fs,
            r_index: 0,
            pre_samples: 0,
            post_samples: 0,
            dominant_rr_s,
            beats_used: 0,
            leads: LeadSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pre_samples + self.post_samples + 1
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }
}

fn within(rr: f64, dominant: f64, tolerance: f64) -> bool {
    (rr - dominant).abs() <= tolerance * dominant
}

/// Sample-wise median of every usable beat, per lead.
///
/// Fails softly (`ok == false`) with fewer than `min_beats` usable beats or
/// when no window fits inside the record.
pub fn build_median_beat(record: &EcgRecord, r_peaks: &Events, cfg: &MedianConfig) -> MedianBeat {
    let fs = record.fs;
    let peaks = &r_peaks.indices;
    if peaks.len() < 2 {
        return MedianBeat::failed(fs, 0.0, format!("need at least 2 R-peaks, found {}", peaks.len()));
    }
    let rr = RRSeries::from_events(r_peaks, fs);
    let dominant = rr.median().unwrap_or(0.0);

    let pre = ((cfg.pre_fraction * dominant).max(cfg.min_pre_s) * fs).round() as usize;
    let post = ((cfg.post_fraction * dominant).max(cfg.min_post_s) * fs).round() as usize;
    let n = record.sample_count();

    let usable: Vec<usize> = peaks
        .iter()
        .enumerate()
        .filter(|&(k, &r)| {
            let before = (k > 0).then(|| rr.rr[k - 1]);
            let after = rr.rr.get(k).copied();
            let regular = before.into_iter().chain(after).all(|v| within(v, dominant, cfg.rr_tolerance));
            regular && r >= pre && r + post < n
        })
        .map(|(_, &r)| r)
        .collect();

    if usable.is_empty() {
        return MedianBeat::failed(fs, dominant, "no beat window fits inside the record");
    }
    if usable.len() < cfg.min_beats.max(1) {
        return MedianBeat::failed(
            fs,
            dominant,
            format!("only {} usable beats (need {})", usable.len(), cfg.min_beats),
        );
    }

    let width = pre + post + 1;
    let mut leads = LeadSet::new();
    let mut column = Vec::with_capacity(usable.len());
    for (lead, samples) in &record.leads {
        let mut template = Vec::with_capacity(width);
        for offset in 0..width {
            column.clear();
            column.extend(usable.iter().map(|&r| samples[r - pre + offset]));
            template.push(median(&column).unwrap_or(0.0));
        }
        leads.insert(*lead, template);
    }
    debug!(
        "median beat: {} of {} beats, dominant RR {:.3} s, window -{pre}/+{post} samples",
        usable.len(),
        peaks.len(),
        dominant
    );

    MedianBeat {
        ok: true,
        reason: None,
        fs,
        r_index: pre,
        pre_samples: pre,
        post_samples: post,
        dominant_rr_s: dominant,
        beats_used: usable.len(),
        leads,
    }
}
