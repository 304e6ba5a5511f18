//! Limb-lead self-consistency checks.

use crate::record::{EcgRecord, Integrity, Lead, LeadSet};

/// Max and mean |I + III − II| in µV; `None` unless all three leads exist.
pub fn einthoven_residual(leads: &LeadSet) -> Option<(f64, f64)> {
    let i = leads.get(&Lead::I)?;
    let ii = leads.get(&Lead::II)?;
    let iii = leads.get(&Lead::III)?;
    let n = i.len().min(ii.len()).min(iii.len());
    if n == 0 {
        return Some((0.0, 0.0));
    }
    let (max, sum) = (0..n)
        .map(|k| (i[k] + iii[k] - ii[k]).abs())
        .fold((0.0_f64, 0.0), |(max, sum), e| (max.max(e), sum + e));
    Some((max, sum / n as f64))
}

pub fn einthoven_max_abs_error(leads: &LeadSet) -> Option<f64> {
    einthoven_residual(leads).map(|(max, _)| max)
}

/// Max |aVR + aVL + aVF| in µV.
pub fn augmented_max_abs_error(leads: &LeadSet) -> Option<f64> {
    let avr = leads.get(&Lead::aVR)?;
    let avl = leads.get(&Lead::aVL)?;
    let avf = leads.get(&Lead::aVF)?;
    let n = avr.len().min(avl.len()).min(avf.len());
    Some(
        (0..n)
            .map(|k| (avr[k] + avl[k] + avf[k]).abs())
            .fold(0.0, f64::max),
    )
}

/// Integrity block for a record. The Einthoven residuals are null without
/// I, II and III; the absent standard leads are listed.
pub fn integrity_report(record: &EcgRecord, clipped_samples: usize) -> Integrity {
    let einthoven = einthoven_residual(&record.leads);
    let (lo, hi) = record
        .leads
        .values()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = if lo.is_finite() { [lo, hi] } else { [0.0, 0.0] };
    Integrity {
        einthoven_max_abs_error_uV: einthoven.map(|(max, _)| max),
        einthoven_mean_abs_error_uV: einthoven.map(|(_, mean)| mean),
        augmented_max_abs_error_uV: augmented_max_abs_error(&record.leads).unwrap_or(0.0),
        clipped_samples,
        amplitude_range_uV: range,
        missing_leads: record.missing_standard_leads(),
    }
}
