//! Inverse pipeline: R-peaks → median beat → fiducials → global measurements.

pub mod fiducials;
pub mod global;
pub mod median;
pub mod normalize;
pub mod physics;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::MeasureConfig;
use crate::detectors::ecg::detect_record;
use crate::metrics::hrv::{hrv_time, HrvSummary};
use crate::record::EcgRecord;
use crate::signal::{Events, RRSeries};

pub use fiducials::{extract_fiducials, per_beat, BeatFiducials, FiducialConfig, FiducialSet};
pub use global::{global_measurements, GlobalMeasurements};
pub use median::{build_median_beat, MedianBeat, MedianConfig};
pub use normalize::{
    normalize, normalize_str, normalize_str_with_warnings, normalize_with_warnings, validate,
    ValidationWarning,
};
pub use physics::{einthoven_max_abs_error, integrity_report};

/// Everything the measurement pipeline extracts from one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub fs: f64,
    pub r_peaks: Events,
    #[serde(rename = "RR_s")]
    pub rr: Vec<f64>,
    pub hrv: HrvSummary,
    pub median_beat: MedianBeat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fiducials: Option<FiducialSet>,
    #[serde(default)]
    pub beats: Vec<BeatFiducials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global: Option<GlobalMeasurements>,
}

impl Measurement {
    pub fn is_ok(&self) -> bool {
        self.median_beat.ok && self.global.is_some()
    }
}

/// Run the full measurement chain on a normalized record.
///
/// Never fails: structural problems surface as a not-ok median beat and
/// absent fiducials/measurements.
pub fn measure(record: &EcgRecord, cfg: &MeasureConfig) -> Measurement {
    let r_peaks = detect_record(record, &cfg.detector);
    let rr = RRSeries::from_events(&r_peaks, record.fs);
    let hrv = HrvSummary::from(hrv_time(&rr));
    let mean_rr = rr.mean().unwrap_or(0.0);

    let median_beat = build_median_beat(record, &r_peaks, &cfg.median);
    let fiducials = extract_fiducials(&median_beat, mean_rr, &cfg.fiducials);
    let beats = fiducials
        .as_ref()
        .map(|f| per_beat(f, &r_peaks))
        .unwrap_or_default();
    let global = fiducials
        .as_ref()
        .map(|f| global_measurements(&median_beat, f, mean_rr));

    match (&median_beat.reason, &global) {
        (Some(reason), _) => info!("median beat unavailable: {reason}"),
        (None, Some(g)) => debug!(
            "measured HR {:.1} bpm, QRS {:.0} ms, QT {:?} ms",
            g.HR_bpm, g.QRS_ms, g.QT_ms
        ),
        (None, None) => info!("no QRS boundaries found on the median beat"),
    }

    Measurement {
        fs: record.fs,
        r_peaks,
        rr: rr.rr,
        hrv,
        median_beat,
        fiducials,
        beats,
        global,
    }
}
