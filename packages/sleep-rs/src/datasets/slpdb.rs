use crate::annotations::{rasterize, AnnotationEvent, StageVocabulary};
use crate::clock::EpochGrid;
use crate::config::ReadOptions;
use crate::datasets::{Dataset, DatasetSession, ReadContext};
use crate::error::{Result, SleepError};
use crate::metadata::parse_slpdb_comments;
use crate::types::{DatasetKind, EcgHandle, HeartbeatSource, Mode, Record};
use crate::wfdb::{read_annotations, MitAnnotation, WfdbHeader};

const EPOCH_LENGTH: u32 = 30;
const ECG_SIGNAL: &str = "ECG";
const STAGE_EXTENSION: &str = "st";
const BEAT_EXTENSION: &str = "ecg";

/// MIT-BIH Polysomnographic Database on PhysioNet (WFDB records `slp01a`...)
pub struct Slpdb;

impl Dataset for Slpdb {
    fn kind(&self) -> DatasetKind {
        DatasetKind::Slpdb
    }

    fn validate(&self, options: &ReadOptions) -> Result<()> {
        match options.activity_source {
            Some(source) => Err(SleepError::InvalidConfig(format!(
                "SLPDB has no activity data (requested {:?})",
                source
            ))),
            None => Ok(()),
        }
    }

    fn list_records(&self, ctx: &ReadContext) -> Result<Vec<String>> {
        let names = ctx.resolver.list("")?;
        Ok(match ctx.resolver.mode() {
            // The remote listing is the RECORDS file: bare record names
            Mode::Online => names.into_iter().filter(|n| !n.contains('.')).collect(),
            Mode::Offline => names
                .into_iter()
                .filter_map(|n| n.strip_suffix(".hea").map(String::from))
                .collect(),
        })
    }

    fn open_session(&self, _ctx: &ReadContext) -> Result<Box<dyn DatasetSession>> {
        Ok(Box::new(SlpdbSession))
    }
}

struct SlpdbSession;

/// Stage annotations carry one aux label per 30 s epoch
fn stage_events(header: &WfdbHeader, annotations: &[MitAnnotation]) -> Vec<AnnotationEvent> {
    annotations
        .iter()
        .filter_map(|a| {
            Some(AnnotationEvent {
                concept: a.aux.clone()?,
                start: a.sample as f64 / header.sampling_rate,
                duration: EPOCH_LENGTH as f64,
            })
        })
        .collect()
}

impl DatasetSession for SlpdbSession {
    fn assemble(&self, ctx: &ReadContext, record_id: &str) -> Result<Record> {
        let header_path =
            ctx.resolver
                .require(record_id, &format!("{}.hea", record_id), "record header")?;
        let header = WfdbHeader::open(&header_path)?;

        let stage_path = ctx.resolver.require(
            record_id,
            &format!("{}.{}", record_id, STAGE_EXTENSION),
            "sleep stage annotations",
        )?;
        let events = stage_events(&header, &read_annotations(&stage_path)?);
        if events.is_empty() {
            return Err(SleepError::InvalidAnnotation(format!(
                "{}: no scored epochs",
                stage_path.display()
            )));
        }
        let scored_until = events
            .iter()
            .map(|e| e.start + e.duration)
            .fold(0.0, f64::max);
        let grid = EpochGrid::covering(scored_until, EPOCH_LENGTH as f64)?;
        let sleep_stages = rasterize(&events, &grid, StageVocabulary::Slpdb);

        let source = ctx.options.heartbeats_source;
        let locate_ecg = || -> Result<EcgHandle> {
            let spec = header
                .signal_index(ECG_SIGNAL)
                .map(|i| &header.signals[i])
                .ok_or_else(|| SleepError::missing(record_id, "ECG signal"))?;
            if source == HeartbeatSource::Annotation {
                if !ctx.resolver.local_path(&spec.file_name).is_file() {
                    return Err(SleepError::missing(record_id, "waveform"));
                }
            } else {
                ctx.resolver.require(record_id, &spec.file_name, "waveform")?;
            }
            Ok(EcgHandle::wfdb(header_path.clone(), ECG_SIGNAL))
        };
        let read_beats = || -> Result<Vec<f64>> {
            let path = ctx.resolver.require(
                record_id,
                &format!("{}.{}", record_id, BEAT_EXTENSION),
                "heartbeat annotations",
            )?;
            Ok(read_annotations(&path)?
                .iter()
                .filter(|a| a.is_qrs())
                .map(|a| a.sample as f64 / header.sampling_rate)
                .collect())
        };
        let heartbeats = ctx.resolver.resolve_heartbeats(
            record_id,
            source,
            &ctx.cache,
            ctx.detector.as_deref(),
            locate_ecg,
            read_beats,
        )?;

        Ok(Record {
            id: record_id.to_string(),
            sleep_stages,
            sleep_stage_duration: EPOCH_LENGTH,
            recording_start_time: header.base_time,
            heartbeats: heartbeats.heartbeats,
            ecg: heartbeats.ecg,
            activity_counts: None,
            subject_data: parse_slpdb_comments(&header.comments),
        })
    }
}
