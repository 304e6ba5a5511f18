//! Standard and extended lead derivation, plus post-derivation lead hooks.

use serde::{Deserialize, Serialize};

use crate::error::{EcgError, Result};
use crate::record::{Lead, LeadSet};
use crate::synth::lead_field::{Electrode, ElectrodePotentials};
use crate::synth::waves::{gaussian, sigmoid};

const CHEST: [(Electrode, Lead); 6] = [
    (Electrode::V1, Lead::V1),
    (Electrode::V2, Lead::V2),
    (Electrode::V3, Lead::V3),
    (Electrode::V4, Lead::V4),
    (Electrode::V5, Lead::V5),
    (Electrode::V6, Lead::V6),
];

/// Build the lead set from electrode potentials.
///
/// I and II come from the limb electrodes, chest leads are referenced to
/// Wilson's central terminal; everything else is [`derive_dependent`].
pub fn derive_leads(potentials: &ElectrodePotentials, extended: bool) -> Result<LeadSet> {
    let ra = potentials.get(Electrode::RA)?;
    let la = potentials.get(Electrode::LA)?;
    let ll = potentials.get(Electrode::LL)?;
    let wct: Vec<f64> = (0..ra.len())
        .map(|i| (ra[i] + la[i] + ll[i]) / 3.0)
        .collect();

    let mut leads = LeadSet::new();
    leads.insert(Lead::I, la.iter().zip(ra).map(|(l, r)| l - r).collect());
    leads.insert(Lead::II, ll.iter().zip(ra).map(|(l, r)| l - r).collect());
    for (electrode, lead) in CHEST {
        let phi = potentials.get(electrode)?;
        leads.insert(lead, phi.iter().zip(&wct).map(|(p, w)| p - w).collect());
    }
    derive_dependent(&mut leads, extended)?;
    Ok(leads)
}

fn basis(leads: &LeadSet, lead: Lead) -> Result<Vec<f64>> {
    leads
        .get(&lead)
        .cloned()
        .ok_or_else(|| EcgError::MissingLead(lead.to_string()))
}

fn combine(a: &[f64], b: &[f64], ka: f64, kb: f64) -> Vec<f64> {
    a.iter().zip(b).map(|(x, y)| ka * x + kb * y).collect()
}

/// Recompute every dependent lead from I, II and V1–V6.
///
/// III = II − I, aVR = −(I + II)/2, aVL = I − II/2, aVF = II − I/2. The
/// extended leads are linear extrapolations along the chest wall:
/// V3R = 2·V1 − V2, V4R = 3·V1 − 2·V2, V7 = 1.5·V6 − 0.5·V5. With
/// `extended` false any extended leads are removed.
pub fn derive_dependent(leads: &mut LeadSet, extended: bool) -> Result<()> {
    let i = basis(leads, Lead::I)?;
    let ii = basis(leads, Lead::II)?;
    leads.insert(Lead::III, combine(&ii, &i, 1.0, -1.0));
    leads.insert(Lead::aVR, combine(&i, &ii, -0.5, -0.5));
    leads.insert(Lead::aVL, combine(&i, &ii, 1.0, -0.5));
    leads.insert(Lead::aVF, combine(&ii, &i, 1.0, -0.5));

    if extended {
        let v1 = basis(leads, Lead::V1)?;
        let v2 = basis(leads, Lead::V2)?;
        let v5 = basis(leads, Lead::V5)?;
        let v6 = basis(leads, Lead::V6)?;
        leads.insert(Lead::V3R, combine(&v1, &v2, 2.0, -1.0));
        leads.insert(Lead::V4R, combine(&v1, &v2, 3.0, -2.0));
        leads.insert(Lead::V7, combine(&v6, &v5, 1.5, -0.5));
    } else {
        for lead in Lead::EXTENDED {
            leads.remove(&lead);
        }
    }
    Ok(())
}

/// Lead-specific pathology applied after derivation.
///
/// Hooks may only touch independent leads; dependent leads are recomputed
/// afterwards so the limb and extended relationships keep holding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum LeadHook {
    /// Coved J-point elevation with a trailing negative T in V1 and V2.
    RightPrecordialCoved {
        j_points_s: Vec<f64>,
        amplitude_uv: f64,
    },
}

impl LeadHook {
    pub fn targets(&self) -> &'static [Lead] {
        match self {
            LeadHook::RightPrecordialCoved { .. } => &[Lead::V1, Lead::V2],
        }
    }

    pub fn apply(&self, leads: &mut LeadSet, fs: f64) {
        match self {
            LeadHook::RightPrecordialCoved {
                j_points_s,
                amplitude_uv,
            } => {
                for (lead, scale) in [(Lead::V1, 1.0), (Lead::V2, 0.7)] {
                    let Some(samples) = leads.get_mut(&lead) else {
                        continue;
                    };
                    let amp = amplitude_uv * scale;
                    for &j in j_points_s {
                        let first = ((j - 0.05) * fs).ceil().max(0.0) as usize;
                        let last = (((j + 0.45) * fs).floor().max(0.0) as usize).min(samples.len());
                        for (k, sample) in samples.iter_mut().enumerate().take(last).skip(first) {
                            let dt = k as f64 / fs - j;
                            *sample += amp * sigmoid(dt / 0.008) * (-dt.max(0.0) / 0.09).exp()
                                - 0.45 * amp * gaussian(dt - 0.2, 0.05);
                        }
                    }
                }
            }
        }
    }
}

/// Apply hooks, then refresh dependent leads.
pub fn apply_hooks(leads: &mut LeadSet, hooks: &[LeadHook], fs: f64, extended: bool) -> Result<()> {
    if hooks.is_empty() {
        return Ok(());
    }
    for hook in hooks {
        hook.apply(leads, fs);
    }
    derive_dependent(leads, extended)
}
