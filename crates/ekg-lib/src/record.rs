//! The ECG record exchanged with viewers, importers and validation tooling.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::EcgError;
use crate::metrics::hrv::HrvSummary;

/// Lead names, in conventional display order.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lead {
    I,
    II,
    III,
    aVR,
    aVL,
    aVF,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V3R,
    V4R,
    V7,
}

impl Lead {
    /// The twelve standard leads; all are required for a complete record.
    pub const STANDARD: [Lead; 12] = [
        Lead::I,
        Lead::II,
        Lead::III,
        Lead::aVR,
        Lead::aVL,
        Lead::aVF,
        Lead::V1,
        Lead::V2,
        Lead::V3,
        Lead::V4,
        Lead::V5,
        Lead::V6,
    ];

    /// Optional right-sided and posterior extensions.
    pub const EXTENDED: [Lead; 3] = [Lead::V3R, Lead::V4R, Lead::V7];

    /// Leads recorded directly by an 8-channel device; every other lead is a
    /// fixed linear combination of these.
    pub const INDEPENDENT: [Lead; 8] = [
        Lead::I,
        Lead::II,
        Lead::V1,
        Lead::V2,
        Lead::V3,
        Lead::V4,
        Lead::V5,
        Lead::V6,
    ];

    pub const ALL: [Lead; 15] = [
        Lead::I,
        Lead::II,
        Lead::III,
        Lead::aVR,
        Lead::aVL,
        Lead::aVF,
        Lead::V1,
        Lead::V2,
        Lead::V3,
        Lead::V4,
        Lead::V5,
        Lead::V6,
        Lead::V3R,
        Lead::V4R,
        Lead::V7,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Lead::I => "I",
            Lead::II => "II",
            Lead::III => "III",
            Lead::aVR => "aVR",
            Lead::aVL => "aVL",
            Lead::aVF => "aVF",
            Lead::V1 => "V1",
            Lead::V2 => "V2",
            Lead::V3 => "V3",
            Lead::V4 => "V4",
            Lead::V5 => "V5",
            Lead::V6 => "V6",
            Lead::V3R => "V3R",
            Lead::V4R => "V4R",
            Lead::V7 => "V7",
        }
    }

    pub fn is_extended(self) -> bool {
        Lead::EXTENDED.contains(&self)
    }
}

impl fmt::Display for Lead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Lead {
    type Err = EcgError;

    /// Accepts the canonical names plus the spellings importers produce
    /// (`avr`, `AVR`, `LEAD_II`, `lead ii`, `v4r`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_uppercase();
        let cleaned = cleaned.strip_prefix("LEAD").unwrap_or(&cleaned);
        let lead = match cleaned {
            "I" => Lead::I,
            "II" => Lead::II,
            "III" => Lead::III,
            "AVR" => Lead::aVR,
            "AVL" => Lead::aVL,
            "AVF" => Lead::aVF,
            "V1" => Lead::V1,
            "V2" => Lead::V2,
            "V3" => Lead::V3,
            "V4" => Lead::V4,
            "V5" => Lead::V5,
            "V6" => Lead::V6,
            "V3R" => Lead::V3R,
            "V4R" => Lead::V4R,
            "V7" => Lead::V7,
            _ => return Err(EcgError::UnknownLead(s.to_string())),
        };
        Ok(lead)
    }
}

/// Lead name → samples in microvolts.
pub type LeadSet = BTreeMap<Lead, Vec<f64>>;

/// Reads `null` as the type's default; pair with `#[serde(default)]` so an
/// absent key behaves the same.
pub(crate) fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(d).map(Option::unwrap_or_default)
}

/// Frontal-plane axes in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    #[serde(rename = "P", default, skip_serializing_if = "Option::is_none")]
    pub p: Option<f64>,
    #[serde(rename = "QRS", default, deserialize_with = "null_as_default")]
    pub qrs: f64,
    #[serde(rename = "T", default, deserialize_with = "null_as_default")]
    pub t: f64,
}

/// Ground truth and provenance attached to a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub generator_version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub age_years: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub dx: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(rename = "HR_bpm", default, deserialize_with = "null_as_default")]
    pub hr_bpm: f64,
    #[serde(rename = "PR_ms", default, skip_serializing_if = "Option::is_none")]
    pub pr_ms: Option<f64>,
    #[serde(rename = "QRS_ms", default, deserialize_with = "null_as_default")]
    pub qrs_ms: f64,
    #[serde(rename = "QT_ms", default, deserialize_with = "null_as_default")]
    pub qt_ms: f64,
    #[serde(rename = "QTc_ms", default, deserialize_with = "null_as_default")]
    pub qtc_ms: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub axes_deg: Axes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv: Option<HrvSummary>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub device_mode: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artifacts: String,
}

/// Self-consistency metrics of the final lead set.
///
/// The Einthoven residuals are `None` when I, II or III is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[allow(non_snake_case)]
pub struct Integrity {
    #[serde(default)]
    pub einthoven_max_abs_error_uV: Option<f64>,
    #[serde(default)]
    pub einthoven_mean_abs_error_uV: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub augmented_max_abs_error_uV: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub clipped_samples: usize,
    #[serde(default, deserialize_with = "null_as_default")]
    pub amplitude_range_uV: [f64; 2],
    #[serde(default, deserialize_with = "null_as_default")]
    pub missing_leads: Vec<Lead>,
}

/// Canonical ECG record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgRecord {
    pub fs: f64,
    pub duration_s: f64,
    #[serde(rename = "leads_uV")]
    pub leads: LeadSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Targets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<Integrity>,
}

impl EcgRecord {
    /// Samples every lead has; the shortest lead when lengths disagree.
    pub fn sample_count(&self) -> usize {
        self.leads.values().map(Vec::len).min().unwrap_or(0)
    }

    pub fn lead(&self, lead: Lead) -> Option<&[f64]> {
        self.leads.get(&lead).map(Vec::as_slice)
    }

    /// Presence flag for every known lead, present or not.
    pub fn presence(&self) -> BTreeMap<Lead, bool> {
        Lead::ALL
            .iter()
            .map(|lead| (*lead, self.leads.contains_key(lead)))
            .collect()
    }

    pub fn missing_standard_leads(&self) -> Vec<Lead> {
        Lead::STANDARD
            .iter()
            .copied()
            .filter(|lead| !self.leads.contains_key(lead))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_standard_leads().is_empty()
    }

    pub fn is_synthetic(&self) -> Option<bool> {
        self.targets.as_ref().and_then(|t| t.synthetic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lead_aliases_parse() {
        assert_eq!("avr".parse::<Lead>().unwrap(), Lead::aVR);
        assert_eq!("AVF".parse::<Lead>().unwrap(), Lead::aVF);
        assert_eq!("LEAD_II".parse::<Lead>().unwrap(), Lead::II);
        assert_eq!("lead iii".parse::<Lead>().unwrap(), Lead::III);
        assert_eq!("v4r".parse::<Lead>().unwrap(), Lead::V4R);
        assert!("V8".parse::<Lead>().is_err());
    }

    #[test]
    fn lead_names_round_trip_through_json_keys() {
        let mut leads = LeadSet::new();
        leads.insert(Lead::aVL, vec![1.0, 2.0]);
        let record = EcgRecord {
            fs: 500.0,
            duration_s: 0.004,
            leads,
            targets: None,
            integrity: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json["leads_uV"]["aVL"].is_array());
        let back: EcgRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn presence_covers_every_known_lead() {
        let mut leads = LeadSet::new();
        leads.insert(Lead::II, vec![0.0; 4]);
        let record = EcgRecord {
            fs: 1000.0,
            duration_s: 0.004,
            leads,
            targets: None,
            integrity: None,
        };
        let presence = record.presence();
        assert_eq!(presence.len(), Lead::ALL.len());
        assert!(presence[&Lead::II]);
        assert!(!presence[&Lead::V7]);
        assert_eq!(record.missing_standard_leads().len(), 11);
    }

    #[test]
    fn sample_count_is_the_shortest_lead() {
        let mut leads = LeadSet::new();
        leads.insert(Lead::I, vec![0.0; 10]);
        leads.insert(Lead::V6, vec![0.0; 7]);
        leads.insert(Lead::II, vec![0.0; 10]);
        let record = EcgRecord {
            fs: 500.0,
            duration_s: 0.02,
            leads,
            targets: None,
            integrity: None,
        };
        assert_eq!(record.sample_count(), 7);
    }

    #[test]
    fn partial_and_null_targets_fall_back_to_defaults() {
        let targets: Targets = serde_json::from_str(
            r#"{"synthetic": true, "HR_bpm": null, "axes_deg": {"QRS": 60}, "hrv": {"SDNN": 40}}"#,
        )
        .unwrap();
        assert_eq!(targets.synthetic, Some(true));
        assert_eq!(targets.hr_bpm, 0.0);
        assert_eq!(targets.axes_deg.qrs, 60.0);
        assert_eq!(targets.axes_deg.t, 0.0);
        let hrv = targets.hrv.unwrap();
        assert_eq!(hrv.sdnn_ms, 40.0);
        assert_eq!(hrv.rmssd_ms, 0.0);

        let targets: Targets = serde_json::from_str(r#"{"axes_deg": null, "dx": null}"#).unwrap();
        assert_eq!(targets.axes_deg, Axes::default());
        assert!(targets.dx.is_empty());
    }

    #[test]
    fn integrity_without_limb_leads_has_no_einthoven_residual() {
        let integrity: Integrity = serde_json::from_str(
            r#"{"einthoven_max_abs_error_uV": null, "clipped_samples": 3, "amplitude_range_uV": [-5, 5]}"#,
        )
        .unwrap();
        assert!(integrity.einthoven_max_abs_error_uV.is_none());
        assert!(integrity.einthoven_mean_abs_error_uV.is_none());
        assert_eq!(integrity.clipped_samples, 3);
    }
}
