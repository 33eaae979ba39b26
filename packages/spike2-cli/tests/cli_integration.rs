use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

#[path = "../../spike2-rs/tests/common/mod.rs"]
mod common;

use common::*;

fn spike2() -> Command {
    let mut cmd = Command::cargo_bin("spike2").unwrap();
    cmd.env_remove("SPIKE2_FILE");
    cmd
}

fn write_export(dir: &TempDir) -> PathBuf {
    let (times, values) = sampled(500, 1000.0, |t| (2.0 * std::f64::consts::PI * 5.0 * t).sin() + 1.0);
    MatWriter::new()
        .add("EMG", waveform_record(&times, &values, 0.001, "V"))
        .add("Trig", event_record(&[0.1, 0.2, 0.3]))
        .add("Keyboard", keyboard_record(&[0.05], "s"))
        .write(&dir.path().join("trial1.mat"))
}

fn stdout_json(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    serde_json::from_str(&stdout).unwrap()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    spike2()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    spike2()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("spike2"));
}

#[test]
fn test_help_flag() {
    spike2()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Spike2"));
}

// =============================================================================
// INFO SUBCOMMAND
// =============================================================================

#[test]
fn test_info_lists_channels() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    spike2()
        .args(["info", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("EMG"))
        .stdout(predicate::str::contains("waveform"))
        .stdout(predicate::str::contains("Trig"))
        .stdout(predicate::str::contains("keyboard"));
}

#[test]
fn test_info_json() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    let parsed = stdout_json(spike2().args(["info", "--json", "--file"]).arg(&file));

    assert_eq!(parsed["trial_name"], "trial1");
    let channels = parsed["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 3);
    assert_eq!(channels[0]["name"], "EMG");
    assert_eq!(channels[0]["kind"], "waveform");
    assert_eq!(channels[0]["count"], 500);
    assert_eq!(channels[0]["sampling_frequency"], 1000);
    assert_eq!(channels[1]["kind"], "event");
    assert_eq!(channels[1]["count"], 3);
}

#[test]
fn test_info_file_from_env() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    spike2()
        .env("SPIKE2_FILE", &file)
        .args(["info", "--channels", "Trig"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Trig"))
        .stdout(predicate::str::contains("EMG").not());
}

#[test]
fn test_info_unknown_channel_lists_available() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    spike2()
        .args(["info", "--channels", "Torque", "--file"])
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Torque"))
        .stderr(predicate::str::contains("EMG, Trig, Keyboard"));
}

#[test]
fn test_info_wrong_file_type() {
    let dir = TempDir::new().unwrap();
    let smr = dir.path().join("trial1.smr");
    std::fs::write(&smr, b"binary").unwrap();
    spike2()
        .args(["info", "--file"])
        .arg(&smr)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("export the data to .mat"));
}

// =============================================================================
// VALIDATE SUBCOMMAND
// =============================================================================

#[test]
fn test_validate_good_file() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    spike2()
        .args(["validate", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("valid Spike2 export (3 channels"));
}

#[test]
fn test_validate_missing_file_json() {
    let output = spike2()
        .args(["validate", "--json", "--file", "/nonexistent/trial.mat"])
        .assert()
        .code(2);
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["exists"], false);
    assert!(parsed["error"].as_str().unwrap().contains("not found"));
}

#[test]
fn test_validate_corrupt_file() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad.mat");
    std::fs::write(&bad, b"definitely not a MAT file").unwrap();
    spike2()
        .args(["validate", "--file"])
        .arg(&bad)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

// =============================================================================
// PROCESS SUBCOMMAND
// =============================================================================

#[test]
fn test_process_steps() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    let parsed = stdout_json(
        spike2()
            .args(["process", "--channel", "EMG", "--step", "remove_mean", "--step", "rect"])
            .args(["--step", "lowpass:20", "--file"])
            .arg(&file),
    );

    assert_eq!(parsed["channel"], "EMG");
    assert_eq!(parsed["values"].as_array().unwrap().len(), 500);
    let markers: Vec<&str> = parsed["provenance"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["marker"].as_str().unwrap())
        .collect();
    assert_eq!(markers, vec!["remove_mean", "rect", "filt_20_lowpass"]);
}

#[test]
fn test_process_pipeline_file_to_output() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    let pipeline = dir.path().join("steps.json");
    std::fs::write(
        &pipeline,
        r#"[{"op": "calibrate", "slope": 2.0}, {"op": "interp_new_fs", "new_fs": 100}]"#,
    )
    .unwrap();
    let out = dir.path().join("out").join("emg.json");

    spike2()
        .args(["process", "--channel", "EMG", "--compact", "--pipeline"])
        .arg(&pipeline)
        .arg("--file")
        .arg(&file)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(written["values"].as_array().unwrap().len(), 50);
    assert_eq!(written["provenance"].as_array().unwrap().len(), 2);
}

#[test]
fn test_process_saves_trial() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    let save_dir = dir.path().join("saved");

    spike2()
        .args(["process", "--channel", "EMG", "--step", "rect", "--file"])
        .arg(&file)
        .arg("--save-trial")
        .arg(&save_dir)
        .assert()
        .success();

    let trial = spike2_rs::trial::load(save_dir.join("trial1.json")).unwrap();
    let emg = trial.channel("EMG").and_then(|c| c.as_waveform()).unwrap();
    assert_eq!(emg.last_operation(), Some("rect"));
}

#[test]
fn test_process_invalid_cutoff() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    spike2()
        .args(["process", "--channel", "EMG", "--step", "lowpass:600", "--file"])
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Nyquist"));
}

#[test]
fn test_process_non_waveform_channel() {
    let dir = TempDir::new().unwrap();
    let file = write_export(&dir);
    spike2()
        .args(["process", "--channel", "Trig", "--step", "rect", "--file"])
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not a waveform"));
}

#[test]
fn test_process_bad_step_syntax() {
    spike2()
        .args(["process", "--channel", "EMG", "--step", "smooth", "--file", "x.mat"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown processing step"));
}
