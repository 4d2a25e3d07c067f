use std::collections::HashMap;

use crate::config::ReadOptions;
use crate::datasets::nsrr::{self, ANNOTATIONS_DIR, DATASETS_DIR};
use crate::datasets::{Dataset, DatasetSession, ReadContext};
use crate::error::{Result, SleepError};
use crate::metadata::{GenderCoding, SubjectColumns, SubjectTable};
use crate::types::{DatasetKind, Record};

const VISITS: [&str; 2] = ["shhs1", "shhs2"];
const ECG_CHANNEL: &str = "ECG";

/// Sleep Heart Health Study: records `<visit>/<visit>-<nsrrid>` for two visits
pub struct Shhs;

fn subject_columns(visit: &str) -> SubjectColumns {
    SubjectColumns {
        id: "nsrrid",
        gender: "gender",
        age: if visit == "shhs2" { "age_s2" } else { "age_s1" },
        weight: Some("weight"),
        gender_coding: GenderCoding::MaleOneFemaleTwo,
    }
}

/// `("shhs1", 200001)` for `shhs1/shhs1-200001`
fn split_id(record_id: &str) -> Result<(&str, i64)> {
    let bad_id = || SleepError::ParseError(format!("SHHS record id '{}'", record_id));
    let (visit, name) = record_id.split_once('/').ok_or_else(bad_id)?;
    let nsrrid = name
        .strip_prefix(visit)
        .and_then(|rest| rest.strip_prefix('-'))
        .and_then(|n| n.parse().ok())
        .ok_or_else(bad_id)?;
    Ok((visit, nsrrid))
}

impl Dataset for Shhs {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Shhs
    }

    fn validate(&self, options: &ReadOptions) -> Result<()> {
        match options.activity_source {
            Some(source) => Err(SleepError::InvalidConfig(format!(
                "SHHS has no activity data (requested {:?})",
                source
            ))),
            None => Ok(()),
        }
    }

    fn list_records(&self, ctx: &ReadContext) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for visit in VISITS {
            let subfolder = format!("{}/{}", ANNOTATIONS_DIR, visit);
            ids.extend(
                nsrr::annotated_records(ctx, &subfolder)?
                    .into_iter()
                    .map(|name| format!("{}/{}", visit, name)),
            );
        }
        Ok(ids)
    }

    fn pattern_key<'a>(&self, record_id: &'a str) -> &'a str {
        record_id
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(record_id)
    }

    fn open_session(&self, ctx: &ReadContext) -> Result<Box<dyn DatasetSession>> {
        let mut subjects = HashMap::new();
        for visit in VISITS {
            let pattern = format!("{}-dataset-[0-9]*.csv", visit);
            let table = match ctx
                .resolver
                .find_table(DATASETS_DIR, &pattern)
                .and_then(|path| SubjectTable::load(&path, &subject_columns(visit)))
            {
                Ok(table) => table,
                Err(e) => {
                    log::warn!("{} subject data unavailable: {}", visit, e);
                    SubjectTable::default()
                }
            };
            subjects.insert(visit.to_string(), table);
        }
        Ok(Box::new(ShhsSession { subjects }))
    }
}

struct ShhsSession {
    subjects: HashMap<String, SubjectTable>,
}

impl DatasetSession for ShhsSession {
    fn assemble(&self, ctx: &ReadContext, record_id: &str) -> Result<Record> {
        let (visit, nsrrid) = split_id(record_id)?;
        let psg = nsrr::read_psg(ctx, record_id, ECG_CHANNEL)?;

        Ok(Record {
            id: record_id.to_string(),
            sleep_stages: psg.sleep_stages,
            sleep_stage_duration: psg.sleep_stage_duration,
            recording_start_time: psg.clock.recording_start,
            heartbeats: psg.heartbeats.heartbeats,
            ecg: psg.heartbeats.ecg,
            activity_counts: None,
            subject_data: self
                .subjects
                .get(visit)
                .map(|table| table.lookup(nsrrid))
                .unwrap_or_default(),
        })
    }
}
