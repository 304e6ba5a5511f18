use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use serde_json::Value;
use std::error::Error;

#[derive(Deserialize)]
struct ValidateOutput {
    fs: f64,
    duration_s: f64,
    leads: Vec<String>,
    warnings: Vec<Value>,
    quality: Value,
}

#[derive(Deserialize)]
struct Check {
    field: String,
    pass: bool,
}

#[derive(Deserialize)]
struct RoundTripOutput {
    checks: Vec<Check>,
    einthoven_pass: Option<bool>,
    pass: bool,
    quality: Value,
}

#[test]
fn synth_measure_validate_chain() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let record = dir.path().join("record.json");
    let record_arg = record.to_string_lossy().to_string();

    cargo_bin_cmd!("ekg")
        .args([
            "synth", "--age", "30", "--dx", "Normal sinus", "--seed", "4", "--fs", "500",
            "--duration-s", "8", "--extended", "--out", &record_arg,
        ])
        .assert()
        .success();
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&record)?)?;
    assert_eq!(written["fs"], 500.0);
    assert_eq!(written["targets"]["dx"], "Normal sinus");
    assert_eq!(written["leads_uV"]["II"].as_array().map(Vec::len), Some(4000));

    let out = cargo_bin_cmd!("ekg")
        .args(["measure", "--input", &record_arg])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let measured: Value = serde_json::from_slice(&out)?;
    let hr = measured["global"]["HR_bpm"].as_f64().ok_or("missing HR")?;
    assert!((hr - 70.0).abs() < 8.0, "HR {hr}");
    assert!(measured["median_beat"]["ok"].as_bool().unwrap_or(false));

    let out = cargo_bin_cmd!("ekg")
        .args(["validate", "--input", &record_arg])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: ValidateOutput = serde_json::from_slice(&out)?;
    assert_eq!(report.fs, 500.0);
    assert_eq!(report.duration_s, 8.0);
    assert_eq!(report.leads.len(), 15);
    assert!(report.warnings.is_empty());
    assert_eq!(report.quality["age_normals"]["age_bin"], "18-40y");
    assert!(report.quality["noise"]["baseline_wander_uV"].is_number());
    assert_eq!(
        report.quality["morphology"]["rs_ratios"].as_object().map(|m| m.len()),
        Some(6)
    );
    Ok(())
}

#[test]
fn validate_drops_unreadable_targets() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("odd.json");
    let samples: Vec<f64> = (0..3000).map(|i| ((i % 400) as f64 - 200.0).abs()).collect();
    let record = serde_json::json!({
        "fs": 500,
        "leads_uV": {"I": samples, "II": samples},
        "targets": {"synthetic": true, "HR_bpm": "fast"},
        "integrity": {"einthoven_max_abs_error_uV": null, "clipped_samples": 0}
    });
    std::fs::write(&path, record.to_string())?;
    let out = cargo_bin_cmd!("ekg")
        .args(["validate", "--input", &path.to_string_lossy()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: ValidateOutput = serde_json::from_slice(&out)?;
    let kinds: Vec<&str> = report
        .warnings
        .iter()
        .filter_map(|w| w["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"dropped_metadata"), "{kinds:?}");
    assert!(kinds.contains(&"missing_targets"));
    assert!(!kinds.contains(&"missing_integrity"));
    assert!(report.quality["age_normals"].is_null());
    Ok(())
}

#[test]
fn validate_flags_a_bare_record() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("bare.json");
    std::fs::write(
        &path,
        r#"{"sampling_rate_hz": "250", "leads_mV": {"I": [0.1, 0.2, 0.1], "II": [0.2, 0.3, 0.2]}}"#,
    )?;
    let out = cargo_bin_cmd!("ekg")
        .args(["validate", "--input", &path.to_string_lossy()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: ValidateOutput = serde_json::from_slice(&out)?;
    assert_eq!(report.fs, 250.0);
    assert_eq!(report.leads, ["I", "II"]);
    let kinds: Vec<&str> = report
        .warnings
        .iter()
        .filter_map(|w| w["kind"].as_str())
        .collect();
    assert!(kinds.contains(&"missing_targets"));
    assert!(kinds.contains(&"missing_standard_leads"));
    assert!(kinds.contains(&"short_recording"));
    Ok(())
}

#[test]
fn strict_roundtrip_passes_for_normal_sinus() -> Result<(), Box<dyn Error>> {
    let out = cargo_bin_cmd!("ekg")
        .args([
            "roundtrip", "--age", "35", "--seed", "7", "--fs", "500", "--duration-s", "12",
            "--strict",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: RoundTripOutput = serde_json::from_slice(&out)?;
    assert!(report.pass);
    assert_eq!(report.einthoven_pass, Some(true));
    assert!(report.checks.iter().any(|c| c.field == "QT_ms" && c.pass));
    assert!(report.quality["age_normals"]["checks"]["HR_bpm"]["z"].is_number());
    Ok(())
}

#[test]
fn diagnoses_lists_every_label() {
    let out = cargo_bin_cmd!("ekg")
        .arg("diagnoses")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8_lossy(&out);
    let labels: Vec<&str> = text.lines().collect();
    assert!(labels.contains(&"Normal sinus"));
    assert!(labels.contains(&"RBBB"));
    assert!(labels.len() >= 20);
}

#[test]
fn malformed_input_fails_with_context() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("broken.json");
    std::fs::write(&path, r#"{"leads_uV": {"II": [1, 2, 3]}}"#)?;
    let out = cargo_bin_cmd!("ekg")
        .args(["measure", "--input", &path.to_string_lossy()])
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&out);
    assert!(stderr.contains("normalizing record"), "{stderr}");

    cargo_bin_cmd!("ekg")
        .args(["synth", "--age", "30", "--dx", "Not a rhythm"])
        .assert()
        .failure();
    Ok(())
}
