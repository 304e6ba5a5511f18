//! Forward simulator: rhythm → dipole → electrodes → leads → device.

pub mod device;
pub mod ectopy;
pub mod lead_field;
pub mod leads;
pub mod morphology;
pub mod params;
pub mod random;
pub mod rhythm;
pub mod waves;

use log::{debug, info};

use crate::config::SynthConfig;
use crate::error::Result;
use crate::measure::physics::integrity_report;
use crate::record::{EcgRecord, Targets};

pub use params::{AgeProfile, Diagnosis, Pathology};
pub use rhythm::{generate_schedule, BeatSchedule};

use leads::{apply_hooks, derive_leads, LeadHook};
use morphology::{render, BeatTemplate};

/// Version tag written into every synthetic record.
pub const GENERATOR_VERSION: &str = concat!("ekg-lib ", env!("CARGO_PKG_VERSION"));

/// Peak J-point elevation of the right-precordial coved pattern (µV).
const COVED_ST_UV: f64 = 250.0;

fn lead_hooks(dx: Diagnosis, schedule: &BeatSchedule, template: &BeatTemplate) -> Vec<LeadHook> {
    match dx {
        Diagnosis::Brugada => {
            let j_points_s = schedule
                .beats
                .iter()
                .filter(|b| !b.flags.is_pvc)
                .filter_map(|b| b.qrs_time)
                .map(|q| q + template.qrs_s)
                .collect();
            vec![LeadHook::RightPrecordialCoved {
                j_points_s,
                amplitude_uv: COVED_ST_UV,
            }]
        }
        _ => Vec::new(),
    }
}

/// Synthesize one record for `(age, diagnosis, seed)`.
///
/// The same inputs always produce the same record. `targets` carries the
/// ground truth the measurement pipeline should recover and `integrity`
/// the physics self-check of the final leads.
pub fn synthesize(age_years: f64, dx: Diagnosis, seed: u32, cfg: &SynthConfig) -> Result<EcgRecord> {
    cfg.validate()?;
    let fs = cfg.fs;
    let samples = (cfg.duration_s * fs).round() as usize;

    let profile = AgeProfile::for_age(age_years);
    let pathology = dx.pathology(&profile);
    let schedule = generate_schedule(&profile, &pathology, cfg.duration_s, seed, cfg.ectopy);
    let template = BeatTemplate::for_diagnosis(dx, &profile, &pathology);
    let vcg = render(&template, &schedule, fs, samples, profile.hrv.rsa_hz, seed);

    let potentials = cfg.geometry.project(&vcg)?;
    let mut leads = derive_leads(&potentials, cfg.extended_leads)?;
    apply_hooks(
        &mut leads,
        &lead_hooks(dx, &schedule, &template),
        fs,
        cfg.extended_leads,
    )?;
    let clipped = device::apply_device(&mut leads, fs, &cfg.device, cfg.extended_leads, seed)?;

    let mean_rr = schedule.mean_rr().unwrap_or_else(|| pathology.rr_s(&profile));
    let qt = template.qt_for_rr(mean_rr);
    let targets = Targets {
        synthetic: Some(true),
        generator_version: GENERATOR_VERSION.to_string(),
        age_years: profile.age_years,
        dx: dx.label().to_string(),
        seed: Some(seed),
        hr_bpm: 60.0 / mean_rr,
        pr_ms: schedule.mean_pr().map(|pr| pr * 1000.0),
        qrs_ms: template.qrs_s * 1000.0,
        qt_ms: qt * 1000.0,
        qtc_ms: template.qtc_s * 1000.0,
        axes_deg: template.axes(),
        hrv: Some(schedule.hrv_summary()),
        device_mode: cfg.device.preset.name().to_string(),
        artifacts: cfg.device.artifacts.name().to_string(),
    };
    debug!(
        "targets: HR {:.1} bpm, PR {:?} ms, QRS {:.0} ms, QT {:.0} ms",
        targets.hr_bpm, targets.pr_ms, targets.qrs_ms, targets.qt_ms
    );

    let mut record = EcgRecord {
        fs,
        duration_s: samples as f64 / fs,
        leads,
        targets: Some(targets),
        integrity: None,
    };
    record.integrity = Some(integrity_report(&record, clipped));
    info!(
        "synthesized {} ({:.1} y, seed {seed}): {} leads × {samples} samples",
        dx,
        profile.age_years,
        record.leads.len()
    );
    Ok(record)
}
