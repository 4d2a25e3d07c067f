use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn sleepread() -> Command {
    let mut cmd = Command::cargo_bin("sleepread").unwrap();
    cmd.env_remove("SLEEP_DATA_DIR").env_remove("NSRR_TOKEN");
    cmd
}

const ANNOTATION: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<PSGAnnotation>
<EpochLength>30</EpochLength>
<ScoredEvents>
<ScoredEvent>
<EventType/>
<EventConcept>Recording Start Time</EventConcept>
<Duration>360.0</Duration>
<ClockTime>01.01.85 22.00.00</ClockTime>
</ScoredEvent>
<ScoredEvent>
<EventType>Stages|Stages</EventType>
<EventConcept>Wake|0</EventConcept>
<Start>0.0</Start>
<Duration>120.0</Duration>
</ScoredEvent>
<ScoredEvent>
<EventType>Stages|Stages</EventType>
<EventConcept>Stage 2 sleep|2</EventConcept>
<Start>120.0</Start>
<Duration>240.0</Duration>
</ScoredEvent>
</ScoredEvents>
</PSGAnnotation>
"#;

/// MESA records 0 and 1 with beat annotations; record 1 lacks its R-point table
fn mesa_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    let mesa = dir.path().join("mesa");
    let annotations = mesa.join("polysomnography/annotations-events-nsrr");
    let rpoints = mesa.join("polysomnography/annotations-rpoints");
    let datasets = mesa.join("datasets");
    for d in [&annotations, &rpoints, &datasets] {
        fs::create_dir_all(d).unwrap();
    }

    for i in 0..2 {
        fs::write(
            annotations.join(format!("mesa-sleep-{:04}-nsrr.xml", i)),
            ANNOTATION,
        )
        .unwrap();
    }
    fs::write(
        rpoints.join("mesa-sleep-0000-rpoint.csv"),
        "epoch,seconds\n1,0.8\n1,1.7\n1,2.5\n",
    )
    .unwrap();
    fs::write(
        datasets.join("mesa-sleep-dataset-0.6.0.csv"),
        "mesaid,examnumber,race1c,gender1,cucmcn1c,sleepage5c\n0,5,0,1,0,63\n1,5,0,0,0,71\n",
    )
    .unwrap();
    dir
}

fn data_dir(dir: &TempDir) -> &str {
    dir.path().to_str().unwrap()
}

fn json_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8(stdout.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

// =============================================================================
// GENERAL
// =============================================================================

#[test]
fn test_no_args_shows_help() {
    sleepread()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_version_flag() {
    sleepread()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("sleepread"));
}

#[test]
fn test_help_flag() {
    sleepread()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sleep records"));
}

#[test]
fn test_unknown_dataset() {
    sleepread()
        .args(["list", "--dataset", "sleep-edf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown dataset"));
}

// =============================================================================
// LIST SUBCOMMAND
// =============================================================================

#[test]
fn test_list_ids() {
    let dir = mesa_tree();
    sleepread()
        .args(["list", "--dataset", "mesa", "--data-dir", data_dir(&dir)])
        .assert()
        .success()
        .stdout("mesa-sleep-0000\nmesa-sleep-0001\n");
}

#[test]
fn test_list_pattern_json() {
    let dir = mesa_tree();
    let output = sleepread()
        .args(["list", "--dataset", "mesa", "--pattern", "*1", "--json"])
        .env("SLEEP_DATA_DIR", data_dir(&dir))
        .assert()
        .success();
    let ids: Vec<String> = serde_json::from_slice(&output.get_output().stdout).unwrap();
    assert_eq!(ids, ["mesa-sleep-0001"]);
}

// =============================================================================
// READ SUBCOMMAND
// =============================================================================

#[test]
fn test_read_summaries() {
    let dir = mesa_tree();
    let output = sleepread()
        .args([
            "read",
            "--dataset",
            "mesa",
            "--data-dir",
            data_dir(&dir),
            "--heartbeats",
            "annotation",
            "--compact",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("mesa-sleep-0001"))
        .stderr(predicate::str::contains("1 records skipped"));

    let lines = json_lines(&output.get_output().stdout);
    assert_eq!(lines.len(), 1);
    let summary = &lines[0];
    assert_eq!(summary["id"], "mesa-sleep-0000");
    assert_eq!(summary["epochs"], 12);
    assert_eq!(summary["recording_start_time"], "22:00:00");
    assert_eq!(summary["stage_counts"]["WAKE"], 4);
    assert_eq!(summary["stage_counts"]["N2"], 8);
    assert_eq!(summary["heartbeats"], 3);
    assert_eq!(summary["subject_data"]["gender"], "MALE");
    assert_eq!(summary["subject_data"]["age"], 63);
}

#[test]
fn test_read_full_to_file() {
    let dir = mesa_tree();
    let out = dir.path().join("records.jsonl");
    sleepread()
        .args([
            "read",
            "--dataset",
            "mesa",
            "--data-dir",
            data_dir(&dir),
            "--pattern",
            "0000",
            "--heartbeats",
            "annotation",
            "--compact",
            "--full",
            "--output",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("1 records written"));

    let lines = json_lines(&fs::read(&out).unwrap());
    assert_eq!(lines[0]["heartbeats"], serde_json::json!([0.8, 1.7, 2.5]));
    assert_eq!(lines[0]["sleep_stages"].as_array().unwrap().len(), 12);
}

#[test]
fn test_read_parallel() {
    let dir = mesa_tree();
    let output = sleepread()
        .args([
            "read",
            "--dataset",
            "mesa",
            "--data-dir",
            data_dir(&dir),
            "--heartbeats",
            "annotation",
            "--compact",
            "--jobs",
            "2",
        ])
        .assert()
        .code(3);
    assert_eq!(json_lines(&output.get_output().stdout).len(), 1);
}

#[test]
fn test_read_shhs_with_activity_is_input_error() {
    let dir = TempDir::new().unwrap();
    sleepread()
        .args([
            "read",
            "--dataset",
            "shhs",
            "--data-dir",
            data_dir(&dir),
            "--activity",
            "actigraphy",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_read_online_without_token() {
    let dir = TempDir::new().unwrap();
    sleepread()
        .args(["read", "--dataset", "mesa", "--online", "--data-dir", data_dir(&dir)])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("NSRR token"));
}

// =============================================================================
// CACHE SUBCOMMAND
// =============================================================================

fn write_cache_entry(root: &Path, name: &str) {
    let dir = root.join("mesa/preprocessed/activity_counts");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(name), b"").unwrap();
}

#[test]
fn test_cache_clear() {
    let dir = mesa_tree();
    write_cache_entry(dir.path(), "mesa-sleep-0000-activity-counts.npy");
    write_cache_entry(dir.path(), "mesa-sleep-0001-activity-counts.npy");

    sleepread()
        .args([
            "cache",
            "clear",
            "--dataset",
            "mesa",
            "--data-dir",
            data_dir(&dir),
            "--kind",
            "activity-counts",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 cached activity_counts files"));
    assert!(!dir.path().join("mesa/preprocessed/activity_counts").exists());
}

#[test]
fn test_cache_clear_unknown_kind() {
    sleepread()
        .args(["cache", "clear", "--dataset", "mesa", "--kind", "spectra"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown cache kind"));
}
