use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveTime;
use serde::Serialize;
use sleep_rs::{EcgHandle, Record, SleepStage, SubjectData};

/// Write JSON string to stdout or a file.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    match output_path {
        Some(path) => std::fs::write(Path::new(path), json)
            .map_err(|e| format!("Failed to write output file '{}': {}", path, e)),
        None => {
            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(json.as_bytes())
                .and_then(|_| handle.write_all(b"\n"))
                .map_err(|e| format!("Failed to write to stdout: {}", e))
        }
    }
}

/// Serialize a value to JSON (pretty or compact).
pub fn to_json<T: Serialize>(value: &T, compact: bool) -> Result<String, String> {
    if compact {
        serde_json::to_string(value).map_err(|e| format!("JSON serialization failed: {}", e))
    } else {
        serde_json::to_string_pretty(value)
            .map_err(|e| format!("JSON serialization failed: {}", e))
    }
}

/// Per-record overview printed by `read`
#[derive(Serialize)]
pub struct RecordSummary<'a> {
    pub id: &'a str,
    pub epochs: usize,
    pub sleep_stage_duration: u32,
    pub duration_seconds: f64,
    pub recording_start_time: Option<NaiveTime>,
    pub stage_counts: BTreeMap<SleepStage, usize>,
    pub heartbeats: Option<usize>,
    pub ecg: Option<&'a EcgHandle>,
    pub activity_counts: Option<usize>,
    /// Epochs without an actigraphy count
    pub unknown_activity_counts: Option<usize>,
    pub subject_data: &'a SubjectData,
}

impl<'a> RecordSummary<'a> {
    pub fn new(record: &'a Record) -> Self {
        let mut stage_counts = BTreeMap::new();
        for stage in &record.sleep_stages {
            *stage_counts.entry(*stage).or_insert(0) += 1;
        }
        Self {
            id: &record.id,
            epochs: record.sleep_stages.len(),
            sleep_stage_duration: record.sleep_stage_duration,
            duration_seconds: record.duration_seconds(),
            recording_start_time: record.recording_start_time,
            stage_counts,
            heartbeats: record.heartbeats.as_ref().map(Vec::len),
            ecg: record.ecg.as_ref(),
            activity_counts: record.activity_counts.as_ref().map(Vec::len),
            unknown_activity_counts: record
                .activity_counts
                .as_ref()
                .map(|counts| counts.iter().filter(|c| c.is_nan()).count()),
            subject_data: &record.subject_data,
        }
    }
}

/// Line-oriented JSON writer over stdout or a file
pub struct JsonLines {
    out: Box<dyn Write>,
    compact: bool,
}

impl JsonLines {
    pub fn open(output_path: Option<&str>, compact: bool) -> Result<Self, String> {
        let out: Box<dyn Write> = match output_path {
            Some(path) => Box::new(BufWriter::new(File::create(path).map_err(|e| {
                format!("Failed to create output file '{}': {}", path, e)
            })?)),
            None => Box::new(BufWriter::new(std::io::stdout())),
        };
        Ok(Self { out, compact })
    }

    pub fn write<T: Serialize>(&mut self, value: &T) -> Result<(), String> {
        let json = to_json(value, self.compact)?;
        self.out
            .write_all(json.as_bytes())
            .and_then(|_| self.out.write_all(b"\n"))
            .map_err(|e| format!("Failed to write output: {}", e))
    }

    pub fn finish(mut self) -> Result<(), String> {
        self.out
            .flush()
            .map_err(|e| format!("Failed to write output: {}", e))
    }
}
