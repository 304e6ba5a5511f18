//! Record normalization from loosely-shaped JSON, and advisory validation.

use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{EcgError, Result};
use crate::record::{EcgRecord, Integrity, Lead, LeadSet, Targets};

const RATE_KEYS: [&str; 4] = ["fs", "sampling_rate_hz", "sampling_rate", "fs_hz"];
/// Lead containers and their scale to microvolts.
const LEAD_KEYS: [(&str, f64); 3] = [("leads_uV", 1.0), ("leads", 1.0), ("leads_mV", 1000.0)];

/// Recordings shorter than this are flagged.
pub const MIN_RECOMMENDED_DURATION_S: f64 = 5.0;

/// Parse and normalize a JSON document.
pub fn normalize_str(json: &str) -> Result<EcgRecord> {
    let value: Value = serde_json::from_str(json)?;
    normalize(&value)
}

/// [`normalize_with_warnings`] on a JSON document.
pub fn normalize_str_with_warnings(json: &str) -> Result<(EcgRecord, Vec<ValidationWarning>)> {
    let value: Value = serde_json::from_str(json)?;
    normalize_with_warnings(&value)
}

/// Bring any accepted record shape into the canonical form.
///
/// Accepts sampling-rate and lead-container aliases, lead arrays or
/// index-keyed objects, and lead-name aliases. Unknown lead names are
/// dropped; leads of unequal length are truncated to the shortest. The
/// duration is always recomputed from the sample count.
pub fn normalize(value: &Value) -> Result<EcgRecord> {
    normalize_with_warnings(value).map(|(record, _)| record)
}

/// [`normalize`], also returning what was discarded on the way.
///
/// A `targets` or `integrity` block that does not fit the schema is
/// dropped with a [`ValidationWarning::DroppedMetadata`]; the leads still
/// load.
pub fn normalize_with_warnings(value: &Value) -> Result<(EcgRecord, Vec<ValidationWarning>)> {
    let root = value.as_object().ok_or(EcgError::MissingField("fs"))?;
    let fs = sampling_rate(root)?;

    let (container, scale) = LEAD_KEYS
        .iter()
        .find_map(|(key, scale)| root.get(*key).map(|v| (v, *scale)))
        .ok_or(EcgError::MissingField("leads_uV"))?;
    let container = container
        .as_object()
        .ok_or_else(|| EcgError::MalformedLead("leads_uV".to_string()))?;

    let mut leads = LeadSet::new();
    for (name, samples) in container {
        let lead = match name.parse::<Lead>() {
            Ok(lead) => lead,
            Err(_) => {
                warn!("dropping unknown lead `{name}`");
                continue;
            }
        };
        if leads.contains_key(&lead) {
            warn!("lead `{name}` duplicates {lead}; keeping the first");
            continue;
        }
        let mut parsed = lead_samples(name, samples)?;
        if scale != 1.0 {
            parsed.iter_mut().for_each(|v| *v *= scale);
        }
        leads.insert(lead, parsed);
    }
    if leads.is_empty() {
        return Err(EcgError::NoLeads);
    }

    let shortest = leads.values().map(Vec::len).min().unwrap_or(0);
    let longest = leads.values().map(Vec::len).max().unwrap_or(0);
    if shortest != longest {
        warn!("leads differ in length ({shortest}..{longest} samples); truncating to {shortest}");
        leads.values_mut().for_each(|v| v.truncate(shortest));
    }

    let mut dropped = Vec::new();
    let targets = metadata_block::<Targets>(root, "targets", &mut dropped);
    let integrity = metadata_block::<Integrity>(root, "integrity", &mut dropped);

    let record = EcgRecord {
        fs,
        duration_s: shortest as f64 / fs,
        leads,
        targets,
        integrity,
    };
    Ok((record, dropped))
}

fn metadata_block<T: DeserializeOwned>(
    root: &Map<String, Value>,
    key: &str,
    dropped: &mut Vec<ValidationWarning>,
) -> Option<T> {
    match root.get(key) {
        Some(Value::Null) | None => None,
        Some(v) => match serde_json::from_value::<T>(v.clone()) {
            Ok(block) => Some(block),
            Err(e) => {
                warn!("dropping unreadable `{key}` block: {e}");
                dropped.push(ValidationWarning::DroppedMetadata {
                    block: key.to_string(),
                    reason: e.to_string(),
                });
                None
            }
        },
    }
}

fn sampling_rate(root: &Map<String, Value>) -> Result<f64> {
    let raw = RATE_KEYS
        .iter()
        .find_map(|key| root.get(*key))
        .ok_or(EcgError::MissingField("fs"))?;
    let fs = match raw {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        _ => f64::NAN,
    };
    if fs.is_finite() && fs > 0.0 {
        Ok(fs)
    } else {
        Err(EcgError::InvalidSamplingRate(fs))
    }
}

fn sample(lead: &str, index: usize, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EcgError::NonNumericSample {
            lead: lead.to_string(),
            index,
        })
}

/// Samples from an array or from an object keyed "0", "1", … (the shape a
/// serialised typed array takes).
fn lead_samples(name: &str, value: &Value) -> Result<Vec<f64>> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| sample(name, i, v))
            .collect(),
        Value::Object(map) => {
            let mut indexed = Vec::with_capacity(map.len());
            for (key, v) in map {
                let index: usize = key
                    .parse()
                    .map_err(|_| EcgError::MalformedLead(name.to_string()))?;
                indexed.push((index, sample(name, index, v)?));
            }
            indexed.sort_by_key(|(i, _)| *i);
            if indexed.iter().enumerate().any(|(pos, (i, _))| pos != *i) {
                return Err(EcgError::MalformedLead(name.to_string()));
            }
            Ok(indexed.into_iter().map(|(_, v)| v).collect())
        }
        _ => Err(EcgError::MalformedLead(name.to_string())),
    }
}

/// Non-blocking findings about a normalized record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationWarning {
    MissingTargets,
    MissingSyntheticFlag,
    /// Standard leads a viewer needs to lay out a 12-lead page.
    MissingStandardLeads { leads: Vec<Lead> },
    MissingExtendedLeads { leads: Vec<Lead> },
    ShortRecording { duration_s: f64, recommended_s: f64 },
    MissingIntegrity,
    /// A metadata block was present but unreadable and was discarded.
    DroppedMetadata { block: String, reason: String },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = |leads: &[Lead]| {
            leads
                .iter()
                .map(|l| l.name())
                .collect::<Vec<_>>()
                .join(", ")
        };
        match self {
            ValidationWarning::MissingTargets => f.write_str("record carries no targets block"),
            ValidationWarning::MissingSyntheticFlag => {
                f.write_str("targets do not say whether the record is synthetic")
            }
            ValidationWarning::MissingStandardLeads { leads } => {
                write!(f, "missing standard leads: {}", names(leads))
            }
            ValidationWarning::MissingExtendedLeads { leads } => {
                write!(f, "missing extended leads: {}", names(leads))
            }
            ValidationWarning::ShortRecording {
                duration_s,
                recommended_s,
            } => write!(
                f,
                "recording lasts {duration_s:.2} s (recommended at least {recommended_s} s)"
            ),
            ValidationWarning::MissingIntegrity => f.write_str("record carries no integrity block"),
            ValidationWarning::DroppedMetadata { block, reason } => {
                write!(f, "dropped unreadable {block} block: {reason}")
            }
        }
    }
}

pub fn validate(record: &EcgRecord) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    match &record.targets {
        None => warnings.push(ValidationWarning::MissingTargets),
        Some(t) if t.synthetic.is_none() => warnings.push(ValidationWarning::MissingSyntheticFlag),
        Some(_) => {}
    }
    let missing = record.missing_standard_leads();
    if !missing.is_empty() {
        warnings.push(ValidationWarning::MissingStandardLeads { leads: missing });
    }
    let extended: Vec<Lead> = Lead::EXTENDED
        .iter()
        .copied()
        .filter(|l| !record.leads.contains_key(l))
        .collect();
    if !extended.is_empty() {
        warnings.push(ValidationWarning::MissingExtendedLeads { leads: extended });
    }
    if record.duration_s < MIN_RECOMMENDED_DURATION_S {
        warnings.push(ValidationWarning::ShortRecording {
            duration_s: record.duration_s,
            recommended_s: MIN_RECOMMENDED_DURATION_S,
        });
    }
    if record.integrity.is_none() {
        warnings.push(ValidationWarning::MissingIntegrity);
    }
    warnings
}
