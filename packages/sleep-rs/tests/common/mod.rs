//! Synthetic dataset trees shaped like the MESA, SHHS and SLPDB downloads
#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sleep_rs::edf::{EdfSignalHeader, EdfWriter};
use sleep_rs::npy;
use sleep_rs::wfdb::{write_annotations, MitAnnotation};

pub const EPOCH_LENGTH: u32 = 30;
pub const ECG_RATE: usize = 8;

const NSRR_STAGES: [&str; 7] = [
    "Wake|0",
    "Stage 1 sleep|1",
    "Stage 2 sleep|2",
    "Stage 3 sleep|3",
    "Stage 4 sleep|4",
    "REM sleep|5",
    "Unscored|9",
];

/// Small deterministic generator for stage sequences
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, bound: u64) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        (self.0 >> 33) % bound
    }
}

pub fn epochs(hours: f64) -> usize {
    (hours * 120.0) as usize
}

fn mkdirs(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
}

/// NSRR annotation document with scored events of 4 to 20 epochs each
pub fn write_nsrr_xml(path: &Path, hours: f64, seed: u64) {
    let record_duration = hours * 3600.0;
    let mut rng = Lcg(seed);
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n<PSGAnnotation>\n",
    );
    writeln!(xml, "<EpochLength>{}</EpochLength>\n<ScoredEvents>", EPOCH_LENGTH).unwrap();
    writeln!(
        xml,
        "<ScoredEvent>\n<EventType/>\n<EventConcept>Recording Start Time</EventConcept>\n\
         <Duration>{}</Duration>\n<ClockTime>01.01.85 20.29.59</ClockTime>\n</ScoredEvent>",
        record_duration
    )
    .unwrap();

    let mut start = 0.0;
    while start < record_duration {
        let candidate = (4 + rng.next(17)) as f64 * EPOCH_LENGTH as f64;
        let duration = candidate.min(record_duration - start);
        let stage = NSRR_STAGES[rng.next(NSRR_STAGES.len() as u64) as usize];
        writeln!(
            xml,
            "<ScoredEvent>\n<EventType>Stages|Stages</EventType>\n<EventConcept>{}</EventConcept>\n\
             <Start>{:.1}</Start>\n<Duration>{:.1}</Duration>\n</ScoredEvent>",
            stage, start, duration
        )
        .unwrap();
        start += duration;
    }
    xml.push_str("</ScoredEvents>\n</PSGAnnotation>\n");

    mkdirs(path);
    fs::write(path, xml).unwrap();
}

/// Single-channel EDF starting at 20:30:00, one-second data records
pub fn write_edf(path: &Path, hours: f64, channel: &str) {
    mkdirs(path);
    let start = NaiveDate::from_ymd_opt(1985, 1, 1)
        .unwrap()
        .and_hms_opt(20, 30, 0)
        .unwrap();
    let headers = vec![EdfSignalHeader::new(channel, "mV", -2.0, 2.0, ECG_RATE)];
    let mut writer = EdfWriter::create(path, start, 1.0, headers).unwrap();
    let seconds = (hours * 3600.0) as usize;
    for s in 0..seconds {
        let samples: Vec<f64> = (0..ECG_RATE)
            .map(|i| ((s * ECG_RATE + i) as f64 * 0.7).sin())
            .collect();
        writer.write_physical_record(&[samples]).unwrap();
    }
    writer.finalize().unwrap();
}

pub fn write_rpoints(path: &Path, hours: f64) {
    mkdirs(path);
    let mut csv = String::from("epoch,RPoint,Type,seconds\n");
    let beats = (hours * 3600.0) as usize;
    for i in 0..beats {
        writeln!(csv, "{},{},1,{:.3}", i / 30 + 1, i * 256, i as f64 + 0.25).unwrap();
    }
    fs::write(path, csv).unwrap();
}

pub struct MesaOptions {
    pub actigraphy: bool,
    /// Precomputed activity count arrays
    pub cached_counts: bool,
    /// Subjects left out of the overlap table
    pub missing_overlap: Vec<usize>,
    pub rpoints: bool,
}

impl Default for MesaOptions {
    fn default() -> Self {
        Self {
            actigraphy: false,
            cached_counts: false,
            missing_overlap: Vec::new(),
            rpoints: false,
        }
    }
}

pub fn mesa_id(i: usize) -> String {
    format!("mesa-sleep-{:04}", i)
}

/// MESA tree with one subject per duration (in hours)
pub fn create_mesa(data_dir: &Path, durations: &[f64], options: &MesaOptions) -> Vec<String> {
    let db = data_dir.join("mesa");
    let mut ids = Vec::new();
    let mut overlap = String::from("mesaid,line,linetime,starttime_psg\n");

    for (i, &hours) in durations.iter().enumerate() {
        let id = mesa_id(i);
        write_edf(&db.join(format!("polysomnography/edfs/{}.edf", id)), hours, "EKG");
        write_nsrr_xml(
            &db.join(format!("polysomnography/annotations-events-nsrr/{}-nsrr.xml", id)),
            hours,
            42 + i as u64,
        );
        if options.rpoints {
            write_rpoints(
                &db.join(format!("polysomnography/annotations-rpoints/{}-rpoint.csv", id)),
                hours,
            );
        }
        if options.actigraphy {
            write_actigraphy(&db.join(format!("actigraphy/{}.csv", id)), i, hours);
            if !options.missing_overlap.contains(&i) {
                writeln!(overlap, "{},1,20:30:00,20:29:59", i).unwrap();
            }
        }
        if options.cached_counts {
            let path = db.join(format!(
                "preprocessed/activity_counts/{}-activity-counts.npy",
                id
            ));
            mkdirs(&path);
            fs::write(path, npy::encode_f64(&vec![10.0; epochs(hours)])).unwrap();
        }
        ids.push(id);
    }

    if options.actigraphy {
        let path = db.join("overlap/mesa-actigraphy-psg-overlap.csv");
        mkdirs(&path);
        fs::write(path, overlap).unwrap();
    }

    let mut subjects = String::from("mesaid,examnumber,race1c,gender1,cucmcn1c,sleepage5c\n");
    for i in 0..durations.len() {
        writeln!(subjects, "{},5,0,{},0,77", i, i % 2).unwrap();
    }
    let path = db.join("datasets/mesa-sleep-dataset-0.0.0.csv");
    mkdirs(&path);
    fs::write(path, subjects).unwrap();

    ids
}

/// Actigraphy export with 20 counts beyond the PSG, one every 30 s from 20:30:00
pub fn write_actigraphy(path: &Path, subject: usize, hours: f64) {
    mkdirs(path);
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .unwrap()
        .and_hms_opt(20, 30, 0)
        .unwrap();
    let mut csv = String::from("mesaid,line,linetime,activity\n");
    for i in 0..epochs(hours) + 20 {
        let linetime = base + chrono::Duration::seconds(30 * i as i64);
        writeln!(
            csv,
            "{},{},{},{}",
            subject,
            i + 1,
            linetime.format("%H:%M:%S"),
            10 + i % 7
        )
        .unwrap();
    }
    fs::write(path, csv).unwrap();
}

/// SHHS tree with both visits for each duration
pub fn create_shhs(data_dir: &Path, durations: &[f64]) -> Vec<String> {
    let db = data_dir.join("shhs");
    let mut ids = Vec::new();
    for (i, &hours) in durations.iter().enumerate() {
        for visit in ["shhs1", "shhs2"] {
            let id = format!("{}/{}-20{:04}", visit, visit, i);
            write_edf(&db.join(format!("polysomnography/edfs/{}.edf", id)), hours, "ECG");
            write_nsrr_xml(
                &db.join(format!("polysomnography/annotations-events-nsrr/{}-nsrr.xml", id)),
                hours,
                7 + i as u64,
            );
            ids.push(id);
        }
    }

    let csv_dir = db.join("datasets");
    fs::create_dir_all(&csv_dir).unwrap();
    let mut shhs1 = String::from("nsrrid,age_s1,gender,weight\n");
    let mut shhs2 = String::from("nsrrid,age_s2,gender,weight\n");
    for i in 0..durations.len() {
        writeln!(shhs1, "2{:05},55,1,77", i).unwrap();
        writeln!(shhs2, "2{:05},61,2,", i).unwrap();
    }
    fs::write(csv_dir.join("shhs1-dataset-0.0.0.csv"), shhs1).unwrap();
    fs::write(csv_dir.join("shhs2-dataset-0.0.0.csv"), shhs2).unwrap();
    ids
}

pub const SLPDB_RATE: u64 = 10;
pub const SLPDB_EPOCHS: u64 = 240;

/// One WFDB record `slp01a` with two hours of 10 Hz ECG and BP, stage and beat
/// annotations
pub fn create_slpdb(data_dir: &Path) -> PathBuf {
    let db = data_dir.join("slpdb");
    fs::create_dir_all(&db).unwrap();
    let samples = SLPDB_EPOCHS * EPOCH_LENGTH as u64 * SLPDB_RATE;

    fs::write(
        db.join("slp01a.hea"),
        format!(
            "slp01a 2 {} {} 23:07:00\n\
             slp01a.dat 16 200/mV 16 0 0 0 0 ECG\n\
             slp01a.dat 16 100/mmHg 16 0 0 0 0 BP\n\
             # 44 M 89\n",
            SLPDB_RATE, samples
        ),
    )
    .unwrap();

    let mut data = Vec::with_capacity(samples as usize * 4);
    for i in 0..samples {
        let ecg = ((i as f64 * 0.3).sin() * 200.0) as i16;
        let bp = 9000i16;
        data.extend_from_slice(&ecg.to_le_bytes());
        data.extend_from_slice(&bp.to_le_bytes());
    }
    fs::write(db.join("slp01a.dat"), data).unwrap();

    let labels = ["W", "1", "2", "3", "4", "R", "MT", "2 OA"];
    let stages: Vec<MitAnnotation> = (0..SLPDB_EPOCHS)
        .map(|epoch| MitAnnotation {
            sample: 1 + epoch * EPOCH_LENGTH as u64 * SLPDB_RATE,
            code: 22,
            aux: Some(labels[(epoch / 30) as usize % labels.len()].to_string()),
        })
        .collect();
    write_annotations(&db.join("slp01a.st"), &stages).unwrap();

    let beats: Vec<MitAnnotation> = (0..samples / SLPDB_RATE)
        .map(|second| MitAnnotation {
            sample: second * SLPDB_RATE + 3,
            code: 1,
            aux: None,
        })
        .collect();
    write_annotations(&db.join("slp01a.ecg"), &beats).unwrap();

    db
}
