//! Global intervals, corrected QT and frontal axes.

use serde::{Deserialize, Serialize};

use crate::measure::fiducials::FiducialSet;
use crate::measure::median::MedianBeat;
use crate::record::Lead;

/// Framingham linear correction coefficient (ms).
pub const FRAMINGHAM_COEFF_MS: f64 = 154.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct GlobalMeasurements {
    pub HR_bpm: f64,
    pub RR_s: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub PR_ms: Option<f64>,
    pub QRS_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QT_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QTc_bazett_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QTc_fridericia_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QTc_framingham_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub P_axis_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub QRS_axis_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub T_axis_deg: Option<f64>,
}

pub fn qtc_bazett(qt_ms: f64, rr_s: f64) -> f64 {
    qt_ms / rr_s.sqrt()
}

pub fn qtc_fridericia(qt_ms: f64, rr_s: f64) -> f64 {
    qt_ms / rr_s.cbrt()
}

pub fn qtc_framingham(qt_ms: f64, rr_s: f64) -> f64 {
    qt_ms + FRAMINGHAM_COEFF_MS * (1.0 - rr_s)
}

/// Wrap an angle into (−180, 180].
pub fn wrap_degrees(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Frontal axis from the net areas of lead I and the inferior projection.
///
/// The inferior component comes from aVF when present, otherwise from
/// (2·II − I)/√3.
pub fn frontal_axis(
    beat: &MedianBeat,
    fiducials: &FiducialSet,
    (start_rel, end_rel): (i64, i64),
) -> Option<f64> {
    let n = beat.len() as i64;
    let start = (beat.r_index as i64 + start_rel).clamp(0, n - 1) as usize;
    let end = (beat.r_index as i64 + end_rel).clamp(0, n - 1) as usize;
    if end <= start {
        return None;
    }
    let area = |lead: Lead| -> Option<f64> {
        let x = beat.leads.get(&lead)?;
        let base = fiducials.baseline.get(&lead).copied().unwrap_or(0.0);
        Some(x[start..=end].iter().map(|v| v - base).sum::<f64>() / beat.fs)
    };
    let x = area(Lead::I)?;
    let y = match area(Lead::aVF) {
        Some(avf) => 2.0 * avf / 3f64.sqrt(),
        None => (2.0 * area(Lead::II)? - x) / 3f64.sqrt(),
    };
    if x == 0.0 && y == 0.0 {
        return None;
    }
    Some(wrap_degrees(y.atan2(x).to_degrees()))
}

/// Combine fiducials with the mean RR into clinical intervals.
pub fn global_measurements(beat: &MedianBeat, fiducials: &FiducialSet, mean_rr_s: f64) -> GlobalMeasurements {
    let rr = mean_rr_s;
    let qt = fiducials.qt_samples().map(|q| fiducials.ms(q));
    let valid_rr = rr > 0.0 && rr.is_finite();
    let corrected = |f: fn(f64, f64) -> f64| qt.filter(|_| valid_rr).map(|q| f(q, rr));

    GlobalMeasurements {
        HR_bpm: if valid_rr { 60.0 / rr } else { 0.0 },
        RR_s: rr,
        PR_ms: fiducials.pr_samples().map(|p| fiducials.ms(p)),
        QRS_ms: fiducials.ms(fiducials.qrs_samples()),
        QT_ms: qt,
        QTc_bazett_ms: corrected(qtc_bazett),
        QTc_fridericia_ms: corrected(qtc_fridericia),
        QTc_framingham_ms: corrected(qtc_framingham),
        P_axis_deg: fiducials
            .p_on
            .zip(fiducials.p_off)
            .and_then(|span| frontal_axis(beat, fiducials, span)),
        QRS_axis_deg: frontal_axis(beat, fiducials, (fiducials.qrs_on, fiducials.qrs_off)),
        T_axis_deg: fiducials
            .t_end
            .and_then(|t| frontal_axis(beat, fiducials, (fiducials.qrs_off, t))),
    }
}
