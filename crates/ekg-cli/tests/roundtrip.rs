use ekg_lib::{
    config::{MeasureConfig, SynthConfig},
    measure::{measure, normalize, physics::einthoven_max_abs_error},
    metrics::hrv::hrv_psd,
    record::{EcgRecord, Lead, LeadSet},
    roundtrip::roundtrip,
    signal::RRSeries,
    synth::{
        generate_schedule,
        params::{EctopyConfig, EctopyKind},
        synthesize, AgeProfile, Diagnosis,
    },
};

fn assert_close(actual: f64, expected: f64, tol: f64) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tol,
        "expected {expected}, got {actual} (diff {diff} > tol {tol})"
    );
}

fn config(fs: f64, duration_s: f64) -> SynthConfig {
    SynthConfig {
        fs,
        duration_s,
        ..SynthConfig::default()
    }
}

#[test]
fn school_age_normal_sinus_scenario() {
    let record = synthesize(8.0, Diagnosis::NormalSinus, 42, &config(1000.0, 10.0)).unwrap();
    assert_eq!(record.sample_count(), 10_000);
    assert!(einthoven_max_abs_error(&record.leads).unwrap() <= 2.0);

    let m = measure(&record, &MeasureConfig::default());
    let peaks = m.r_peaks.len();
    assert!((9..=14).contains(&peaks), "{peaks} R-peaks");
    assert!(m.r_peaks.indices.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn synthetic_ground_truth_is_recovered() {
    let record = synthesize(35.0, Diagnosis::NormalSinus, 7, &config(500.0, 12.0)).unwrap();
    let cfg = MeasureConfig::default();
    let m = measure(&record, &cfg);
    assert!(m.is_ok(), "{:?}", m.median_beat.reason);
    let report = roundtrip(&record, &m, &cfg.tolerances);
    for check in &report.checks {
        assert!(check.pass, "{check:?}");
    }
    assert_eq!(report.einthoven_pass, Some(true));
    assert!(report.pass);
}

#[test]
fn same_seed_same_bytes() {
    let cfg = config(500.0, 5.0);
    let a = synthesize(50.0, Diagnosis::Pacs, 99, &cfg).unwrap();
    let b = synthesize(50.0, Diagnosis::Pacs, 99, &cfg).unwrap();
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn hrv_falls_with_age() {
    let sdnn: Vec<f64> = [0.05, 8.0, 35.0, 75.0]
        .iter()
        .map(|&age| {
            let profile = AgeProfile::for_age(age);
            let pathology = Diagnosis::NormalSinus.pathology(&profile);
            let schedule = generate_schedule(&profile, &pathology, 60.0, 4, None);
            schedule.hrv_summary().sdnn_ms
        })
        .collect();
    assert!(sdnn.windows(2).all(|w| w[0] > w[1]), "{sdnn:?}");
}

#[test]
fn ectopy_rate_is_bounded() {
    let profile = AgeProfile::for_age(40.0);
    let pathology = Diagnosis::NormalSinus.pathology(&profile);
    let pvc = EctopyConfig {
        kind: EctopyKind::Pvc,
        probability: 0.15,
    };
    let schedule = generate_schedule(&profile, &pathology, 60.0, 42, Some(pvc));
    let beats: Vec<_> = schedule.beats.iter().take(50).collect();
    assert_eq!(beats.len(), 50);
    let ectopic = beats.iter().filter(|b| b.is_ectopic()).count();
    assert!(ectopic > 0 && ectopic < 25, "{ectopic} of 50");

    let none = EctopyConfig {
        kind: EctopyKind::None,
        probability: 0.9,
    };
    let schedule = generate_schedule(&profile, &pathology, 60.0, 42, Some(none));
    assert!(schedule.beats.iter().all(|b| !b.is_ectopic()));
}

#[test]
fn complete_block_keeps_atria_and_ventricles_apart() {
    let profile = AgeProfile::for_age(50.0);
    let pathology = Diagnosis::CompleteAvb.pathology(&profile);
    let schedule = generate_schedule(&profile, &pathology, 10.0, 3, None);
    let p_only = schedule
        .beats
        .iter()
        .filter(|b| b.p_time.is_some() && b.qrs_time.is_none())
        .count();
    let qrs_only = schedule
        .beats
        .iter()
        .filter(|b| b.qrs_time.is_some() && b.p_time.is_none())
        .count();
    assert!(p_only >= 5 && qrs_only >= 3, "{p_only} P / {qrs_only} QRS");
    assert!(schedule.mean_pr().is_none());

    let record = synthesize(50.0, Diagnosis::CompleteAvb, 3, &config(500.0, 10.0)).unwrap();
    let targets = record.targets.clone().unwrap();
    assert!(targets.pr_ms.is_none());
    let m = measure(&record, &MeasureConfig::default());
    let g = m.global.expect("escape rhythm is measurable");
    assert_close(g.HR_bpm, targets.hr_bpm, 5.0);
}

#[test]
fn bundle_branch_block_widens_qrs() {
    let cfg = config(500.0, 10.0);
    let mc = MeasureConfig::default();
    let normal = measure(&synthesize(45.0, Diagnosis::NormalSinus, 12, &cfg).unwrap(), &mc);
    let rbbb = measure(&synthesize(45.0, Diagnosis::Rbbb, 12, &cfg).unwrap(), &mc);
    let qrs = |m: &ekg_lib::measure::Measurement| m.global.as_ref().unwrap().QRS_ms;
    assert!(qrs(&rbbb) > qrs(&normal) + 15.0, "{} vs {}", qrs(&rbbb), qrs(&normal));
}

#[test]
fn preexcitation_shortens_pr() {
    let cfg = config(500.0, 10.0);
    let mc = MeasureConfig::default();
    let normal = measure(&synthesize(45.0, Diagnosis::NormalSinus, 12, &cfg).unwrap(), &mc);
    let wpw = measure(&synthesize(45.0, Diagnosis::Wpw, 12, &cfg).unwrap(), &mc);
    let pr = |m: &ekg_lib::measure::Measurement| m.global.as_ref().and_then(|g| g.PR_ms).unwrap();
    assert!(pr(&wpw) < pr(&normal) - 30.0, "{} vs {}", pr(&wpw), pr(&normal));
}

#[test]
fn adult_spectrum_is_respiratory() {
    let profile = AgeProfile::for_age(30.0);
    let pathology = Diagnosis::NormalSinus.pathology(&profile);
    let schedule = generate_schedule(&profile, &pathology, 300.0, 21, None);
    let psd = hrv_psd(
        &RRSeries {
            rr: schedule.rr_intervals(),
        },
        4.0,
    );
    assert!(psd.hf > psd.lf, "HF {} vs LF {}", psd.hf, psd.lf);
}

#[test]
fn normalizing_a_synthetic_record_changes_nothing() {
    let mut cfg = config(500.0, 3.0);
    cfg.extended_leads = true;
    let record = synthesize(20.0, Diagnosis::Lvh, 5, &cfg).unwrap();
    let once = normalize(&serde_json::to_value(&record).unwrap()).unwrap();
    assert_eq!(once, record);
    let twice = normalize(&serde_json::to_value(&once).unwrap()).unwrap();
    assert_eq!(twice, once);
}

/// Piecewise-linear interpolation through (ms, µV) knots.
fn polyline(knots: &[(f64, f64)], t_ms: f64) -> f64 {
    for w in knots.windows(2) {
        let ((t0, v0), (t1, v1)) = (w[0], w[1]);
        if t_ms >= t0 && t_ms <= t1 {
            return v0 + (v1 - v0) * (t_ms - t0) / (t1 - t0);
        }
    }
    0.0
}

/// 500 Hz, 16 beats at RR 0.6 s: triangular QRS of 100 ms and a T wave
/// ending 377 ms after QRS onset.
fn fixture() -> EcgRecord {
    let fs = 500.0;
    let n = 5000;
    let knots = [
        (0.0, 0.0),
        (20.0, -100.0),
        (60.0, 1000.0),
        (80.0, -200.0),
        (100.0, 0.0),
        (200.0, 0.0),
        (300.0, 300.0),
        (377.0, 0.0),
    ];
    let onsets: Vec<f64> = (0..16).map(|k| 340.0 + 600.0 * k as f64).collect();
    let ii: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 * 1000.0 / fs;
            onsets
                .iter()
                .map(|on| polyline(&knots, t - on))
                .sum::<f64>()
        })
        .collect();
    let mut leads = LeadSet::new();
    leads.insert(Lead::I, ii.iter().map(|v| 0.5 * v).collect());
    leads.insert(Lead::III, ii.iter().map(|v| 0.5 * v).collect());
    leads.insert(Lead::II, ii);
    EcgRecord {
        fs,
        duration_s: n as f64 / fs,
        leads,
        targets: None,
        integrity: None,
    }
}

#[test]
fn reference_fixture_through_the_pipeline() {
    let record = fixture();
    let m = measure(&record, &MeasureConfig::default());
    assert_eq!(m.r_peaks.len(), 16);
    assert_eq!(m.median_beat.beats_used, 16);
    let g = m.global.expect("fixture is measurable");
    assert_close(g.HR_bpm, 100.0, 0.01);
    assert_close(g.QRS_ms, 100.0, 3.0);
    assert_close(g.QT_ms.unwrap(), 377.0, 3.0);
    assert_close(g.QTc_bazett_ms.unwrap(), 486.7, 3.0);
    assert_close(g.QTc_framingham_ms.unwrap(), 438.6, 3.0);
    assert!(g.PR_ms.is_none());
    assert_eq!(m.beats.len(), 16);
    assert!(einthoven_max_abs_error(&record.leads).unwrap() < 1e-9);
}

#[test]
fn a_short_trailing_lead_does_not_break_measurement() {
    let mut record = synthesize(40.0, Diagnosis::NormalSinus, 2, &config(500.0, 8.0)).unwrap();
    let v6 = record.leads.get_mut(&Lead::V6).unwrap();
    v6.truncate(v6.len() - 300);
    assert_eq!(record.sample_count(), 3700);
    let m = measure(&record, &MeasureConfig::default());
    assert!(m.median_beat.ok, "{:?}", m.median_beat.reason);
    assert!(m.global.is_some());
}
