use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::{error::Error, ffi::OsString, fs, path::PathBuf};

const EXPECTED_RR: [f64; 15] = [
    0.8, 0.82, 0.79, 0.81, 0.8, 0.78, 0.83, 0.8, 0.79, 0.82, 0.81, 0.8, 0.84, 0.78, 0.8,
];

#[test]
fn process_writes_rr_csv_and_reports_json() -> Result<(), Box<dyn Error>> {
    let out = tempfile::tempdir()?;
    let recording = sample_path("test_data/ecg_synthetic.txt");

    let mut cmd = cargo_bin_cmd!("rrkit");
    cmd.args(["process", &recording, "--no-plot", "--pairs-csv", "--out-dir"])
        .arg(out.path());
    let stdout = cmd.assert().success().get_output().stdout.clone();
    let reports = json_lines(&stdout)?;
    assert_eq!(reports.len(), 1);
    let report = &reports[0];

    assert_eq!(report["sample_count"], 6635);
    assert_eq!(report["skipped_records"], 2);
    assert_eq!(report["peak_count"], 16);
    assert_eq!(report["raw_rr_count"], 15);
    let cleaned = rr_values(&report["cleaned"]["rr"]);
    assert_eq!(cleaned.len(), EXPECTED_RR.len());
    for (got, want) in cleaned.iter().zip(EXPECTED_RR) {
        assert_close(*got, want, 1e-9);
    }

    let rr_csv = fs::read_to_string(out.path().join("rr_intervals_ecg_synthetic.csv"))?;
    let mut lines = rr_csv.lines();
    assert_eq!(lines.next(), Some("RR_interval_s"));
    assert_eq!(lines.count(), EXPECTED_RR.len());

    let pairs_csv = fs::read_to_string(out.path().join("rr_pairs_ecg_synthetic.csv"))?;
    assert_eq!(pairs_csv.lines().count(), EXPECTED_RR.len());
    assert!(!out.path().join("poincare_plot_ecg_synthetic.png").exists());
    Ok(())
}

#[test]
fn process_continues_past_failed_inputs() -> Result<(), Box<dyn Error>> {
    let out = tempfile::tempdir()?;
    let short = sample_path("test_data/ecg_short.txt");
    let good = sample_path("test_data/ecg_synthetic.txt");

    let mut cmd = cargo_bin_cmd!("rrkit");
    cmd.args(["process", &short, &good, "--no-plot", "--out-dir"])
        .arg(out.path());
    let stdout = cmd.assert().failure().get_output().stdout.clone();
    let reports = json_lines(&stdout)?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["peak_count"], 16);

    assert!(out.path().join("rr_intervals_ecg_synthetic.csv").exists());
    assert!(!out.path().join("rr_intervals_ecg_short.csv").exists());
    Ok(())
}

#[test]
fn failed_ecg_plot_leaves_no_outputs() -> Result<(), Box<dyn Error>> {
    let out = tempfile::tempdir()?;
    let recording = sample_path("test_data/ecg_synthetic.txt");
    // A directory where the ECG figure should land makes that output fail.
    fs::create_dir_all(out.path().join("ecg_with_peaks_ecg_synthetic.png").join("taken"))?;

    let mut cmd = cargo_bin_cmd!("rrkit");
    cmd.args(["process", &recording, "--no-plot", "--plot-ecg", "--out-dir"])
        .arg(out.path());
    let stdout = cmd.assert().failure().get_output().stdout.clone();
    assert!(json_lines(&stdout)?.is_empty());

    let names: Vec<_> = fs::read_dir(out.path())?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<Result<_, _>>()?;
    assert_eq!(names, vec![OsString::from("ecg_with_peaks_ecg_synthetic.png")]);
    Ok(())
}

#[test]
fn invalid_flags_fail_before_reading_inputs() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let out_dir = dir.path().join("out");
    let recording = sample_path("test_data/ecg_synthetic.txt");

    let mut cmd = cargo_bin_cmd!("rrkit");
    cmd.args(["process", &recording, "--lowcut", "50", "--highcut", "10", "--out-dir"])
        .arg(&out_dir);
    cmd.assert().failure();
    assert!(!out_dir.exists());
    Ok(())
}

#[test]
fn config_file_is_overridden_by_flags() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let config = dir.path().join("rrkit.toml");
    fs::write(&config, "sampling_rate = 500.0\n\n[cleaning]\nmax_rr = 0.805\n")?;
    let recording = sample_path("test_data/ecg_synthetic.txt");

    let mut cmd = cargo_bin_cmd!("rrkit");
    cmd.args(["process", &recording, "--no-plot", "--config"])
        .arg(&config)
        .arg("--out-dir")
        .arg(dir.path().join("from_file"));
    let stdout = cmd.assert().success().get_output().stdout.clone();
    let report = &json_lines(&stdout)?[0];
    assert_eq!(report["range_kept"], 9);
    assert!(rr_values(&report["cleaned"]["rr"]).iter().all(|&rr| rr < 0.805));

    let mut cmd = cargo_bin_cmd!("rrkit");
    cmd.args(["process", &recording, "--no-plot", "--max-rr", "2.0", "--config"])
        .arg(&config)
        .arg("--out-dir")
        .arg(dir.path().join("from_flags"));
    let stdout = cmd.assert().success().get_output().stdout.clone();
    let report = &json_lines(&stdout)?[0];
    assert_eq!(report["range_kept"], 15);
    Ok(())
}

fn json_lines(stdout: &[u8]) -> Result<Vec<Value>, Box<dyn Error>> {
    let mut values = Vec::new();
    for line in std::str::from_utf8(stdout)?.lines() {
        values.push(serde_json::from_str(line)?);
    }
    Ok(values)
}

fn rr_values(value: &Value) -> Vec<f64> {
    value
        .as_array()
        .expect("rr array")
        .iter()
        .map(|v| v.as_f64().expect("number"))
        .collect()
}

fn assert_close(a: f64, b: f64, tol: f64) {
    let diff = (a - b).abs();
    assert!(diff <= tol, "diff {diff} exceeded tol {tol} ({a} vs {b})");
}

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

fn sample_path(relative: &str) -> String {
    workspace_root().join(relative).to_string_lossy().to_string()
}
