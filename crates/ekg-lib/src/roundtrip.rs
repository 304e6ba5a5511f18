//! Compare a record's ground truth with what the measurement pipeline found.

use serde::{Deserialize, Serialize};

use crate::config::Tolerances;
use crate::measure::global::wrap_degrees;
use crate::measure::physics::einthoven_max_abs_error;
use crate::metrics::quality::{assess, ClinicalValues, QualityReport};
use crate::measure::Measurement;
use crate::record::EcgRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCheck {
    pub field: String,
    pub target: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measured: Option<f64>,
    pub tolerance: f64,
    pub pass: bool,
}

impl FieldCheck {
    fn new(field: &str, target: f64, measured: Option<f64>, tolerance: f64, angular: bool) -> Self {
        let pass = measured.is_some_and(|m| {
            let diff = if angular { wrap_degrees(m - target) } else { m - target };
            diff.abs() <= tolerance
        });
        Self {
            field: field.to_string(),
            target,
            measured,
            tolerance,
            pass,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundTripReport {
    pub checks: Vec<FieldCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "einthoven_max_abs_error_uV")]
    pub einthoven_uv: Option<f64>,
    /// `None` when the record lacks I, II or III and the law was not checked.
    pub einthoven_pass: Option<bool>,
    pub pass: bool,
    /// Signal quality, with the measured values placed against the age
    /// reference. Informational; it does not affect `pass`.
    pub quality: QualityReport,
}

impl RoundTripReport {
    pub fn failures(&self) -> impl Iterator<Item = &FieldCheck> {
        self.checks.iter().filter(|c| !c.pass)
    }

    pub fn check(&self, field: &str) -> Option<&FieldCheck> {
        self.checks.iter().find(|c| c.field == field)
    }
}

/// Check each target field against its measured counterpart.
///
/// A record without targets yields only the Einthoven check. PR is skipped
/// when the record has no PR target (no conducted P waves).
pub fn roundtrip(record: &EcgRecord, measurement: &Measurement, tol: &Tolerances) -> RoundTripReport {
    let mut checks = Vec::new();
    if let Some(targets) = &record.targets {
        let g = measurement.global.as_ref();
        checks.push(FieldCheck::new("HR_bpm", targets.hr_bpm, g.map(|g| g.HR_bpm), tol.hr_bpm, false));
        if let Some(pr) = targets.pr_ms {
            checks.push(FieldCheck::new("PR_ms", pr, g.and_then(|g| g.PR_ms), tol.pr_ms, false));
        }
        checks.push(FieldCheck::new("QRS_ms", targets.qrs_ms, g.map(|g| g.QRS_ms), tol.qrs_ms, false));
        checks.push(FieldCheck::new("QT_ms", targets.qt_ms, g.and_then(|g| g.QT_ms), tol.qt_ms, false));
        checks.push(FieldCheck::new(
            "QTc_ms",
            targets.qtc_ms,
            g.and_then(|g| g.QTc_bazett_ms),
            tol.qtc_ms,
            false,
        ));
        checks.push(FieldCheck::new(
            "QRS_axis_deg",
            targets.axes_deg.qrs,
            g.and_then(|g| g.QRS_axis_deg),
            tol.axis_deg,
            true,
        ));
    }

    let einthoven_uv = einthoven_max_abs_error(&record.leads);
    let einthoven_pass = einthoven_uv.map(|e| e <= tol.einthoven_uv);
    let pass = einthoven_pass != Some(false) && checks.iter().all(|c| c.pass);
    let measured = measurement
        .global
        .as_ref()
        .map(ClinicalValues::from_measurements)
        .unwrap_or_default();
    RoundTripReport {
        checks,
        einthoven_uv,
        einthoven_pass,
        pass,
        quality: assess(record, Some(measured)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeasureConfig;
    use crate::measure::measure;
    use crate::record::{Lead, LeadSet};

    #[test]
    fn angular_checks_wrap() {
        let check = FieldCheck::new("QRS_axis_deg", 175.0, Some(-178.0), 20.0, true);
        assert!(check.pass);
        let check = FieldCheck::new("QRS_ms", 100.0, Some(130.0), 20.0, false);
        assert!(!check.pass);
        let check = FieldCheck::new("QT_ms", 400.0, None, 30.0, false);
        assert!(!check.pass);
    }

    #[test]
    fn einthoven_is_unchecked_without_lead_iii() {
        let mut leads = LeadSet::new();
        leads.insert(Lead::I, vec![0.0; 1000]);
        leads.insert(Lead::II, vec![0.0; 1000]);
        let record = EcgRecord {
            fs: 500.0,
            duration_s: 2.0,
            leads,
            targets: None,
            integrity: None,
        };
        let cfg = MeasureConfig::default();
        let report = roundtrip(&record, &measure(&record, &cfg), &cfg.tolerances);
        assert!(report.einthoven_uv.is_none());
        assert_eq!(report.einthoven_pass, None);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["einthoven_pass"].is_null());

        let mut broken = record.clone();
        broken.leads.insert(Lead::III, vec![500.0; 1000]);
        let report = roundtrip(&broken, &measure(&broken, &cfg), &cfg.tolerances);
        assert_eq!(report.einthoven_pass, Some(false));
        assert!(!report.pass);
    }
}
