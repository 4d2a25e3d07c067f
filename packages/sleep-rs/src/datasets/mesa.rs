use crate::actigraphy::{ActigraphySeries, ActigraphySync, OverlapTable};
use crate::config::ReadOptions;
use crate::datasets::nsrr::{self, ANNOTATIONS_DIR, DATASETS_DIR};
use crate::datasets::{Dataset, DatasetSession, ReadContext};
use crate::error::{Result, SleepError};
use crate::metadata::{GenderCoding, SubjectColumns, SubjectTable};
use crate::types::{DatasetKind, Record};

const ID_PREFIX: &str = "mesa-sleep-";
const ECG_CHANNEL: &str = "EKG";
const OVERLAP_FILE: &str = "overlap/mesa-actigraphy-psg-overlap.csv";
const ACTIGRAPHY_DIR: &str = "actigraphy";
const SUBJECT_TABLE_PATTERN: &str = "mesa-sleep-dataset-[0-9]*.csv";

const SUBJECT_COLUMNS: SubjectColumns = SubjectColumns {
    id: "mesaid",
    gender: "gender1",
    age: "sleepage5c",
    weight: None,
    gender_coding: GenderCoding::FemaleZeroMaleOne,
};

/// Multi-Ethnic Study of Atherosclerosis: records `mesa-sleep-NNNN`, with
/// optional wrist actigraphy
pub struct Mesa;

fn subject_id(record_id: &str) -> Result<i64> {
    record_id
        .strip_prefix(ID_PREFIX)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| SleepError::ParseError(format!("MESA record id '{}'", record_id)))
}

impl Dataset for Mesa {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Mesa
    }

    fn validate(&self, _options: &ReadOptions) -> Result<()> {
        Ok(())
    }

    fn list_records(&self, ctx: &ReadContext) -> Result<Vec<String>> {
        Ok(nsrr::annotated_records(ctx, ANNOTATIONS_DIR)?
            .into_iter()
            .filter(|id| id.starts_with(ID_PREFIX))
            .collect())
    }

    fn pattern_key<'a>(&self, record_id: &'a str) -> &'a str {
        record_id.strip_prefix(ID_PREFIX).unwrap_or(record_id)
    }

    fn open_session(&self, ctx: &ReadContext) -> Result<Box<dyn DatasetSession>> {
        let subjects = match ctx
            .resolver
            .find_table(DATASETS_DIR, SUBJECT_TABLE_PATTERN)
            .and_then(|path| SubjectTable::load(&path, &SUBJECT_COLUMNS))
        {
            Ok(table) => table,
            Err(e) => {
                log::warn!("MESA subject data unavailable, demographics will be unknown: {}", e);
                SubjectTable::default()
            }
        };

        let overlap = match ctx.options.activity_source {
            Some(_) => match ctx
                .resolver
                .require("mesa", OVERLAP_FILE, "overlap table")
                .and_then(|path| OverlapTable::load(&path))
            {
                Ok(table) => table,
                Err(e) => {
                    log::warn!("MESA overlap table unavailable: {}", e);
                    OverlapTable::default()
                }
            },
            None => OverlapTable::default(),
        };

        Ok(Box::new(MesaSession {
            subjects,
            overlap,
            sync: ActigraphySync {
                tolerance_epochs: ctx.options.activity_tolerance_epochs,
                ..ActigraphySync::default()
            },
        }))
    }
}

struct MesaSession {
    subjects: SubjectTable,
    overlap: OverlapTable,
    sync: ActigraphySync,
}

impl DatasetSession for MesaSession {
    fn assemble(&self, ctx: &ReadContext, record_id: &str) -> Result<Record> {
        let subject = subject_id(record_id)?;
        let psg = nsrr::read_psg(ctx, record_id, ECG_CHANNEL)?;

        let activity_counts = ctx.resolver.resolve_activity(
            record_id,
            ctx.options.activity_source,
            ctx.options.require_activity,
            &ctx.cache,
            || {
                let overlap = self
                    .overlap
                    .get(subject)
                    .ok_or_else(|| SleepError::missing(record_id, "actigraphy overlap row"))?;
                let path = ctx.resolver.require(
                    record_id,
                    &format!("{}/{}.csv", ACTIGRAPHY_DIR, record_id),
                    "actigraphy",
                )?;
                let series = ActigraphySeries::load(&path)?;
                self.sync.synchronize(
                    record_id,
                    &series,
                    overlap,
                    psg.clock.reference_start,
                    &psg.grid,
                )
            },
        )?;

        let record = Record {
            id: record_id.to_string(),
            sleep_stages: psg.sleep_stages,
            sleep_stage_duration: psg.sleep_stage_duration,
            recording_start_time: psg.clock.recording_start,
            heartbeats: psg.heartbeats.heartbeats,
            ecg: psg.heartbeats.ecg,
            activity_counts,
            subject_data: self.subjects.lookup(subject),
        };
        record.check_alignment()?;
        Ok(record)
    }
}
