// Layout shared by the NSRR cohorts (MESA, SHHS): XML stage annotations, EDF
// waveforms and R-point tables under `polysomnography/`

use std::path::Path;

use crate::annotations::read_nsrr_xml;
use crate::clock::{ClockAlignment, EpochGrid};
use crate::datasets::ReadContext;
use crate::edf::EdfReader;
use crate::error::{Result, SleepError};
use crate::source::ResolvedHeartbeats;
use crate::table::{column, float_cell, open_csv};
use crate::types::{EcgHandle, HeartbeatSource, SleepStage};

pub(super) const ANNOTATIONS_DIR: &str = "polysomnography/annotations-events-nsrr";
pub(super) const EDF_DIR: &str = "polysomnography/edfs";
pub(super) const RPOINTS_DIR: &str = "polysomnography/annotations-rpoints";
pub(super) const DATASETS_DIR: &str = "datasets";

const ANNOTATION_SUFFIX: &str = "-nsrr.xml";

/// The PSG part of a record: stages on their epoch grid, clocks and heartbeats
pub(super) struct Psg {
    pub sleep_stages: Vec<SleepStage>,
    pub sleep_stage_duration: u32,
    pub grid: EpochGrid,
    pub clock: ClockAlignment,
    pub heartbeats: ResolvedHeartbeats,
}

/// Record names with an annotation file in `subfolder`
pub(super) fn annotated_records(ctx: &ReadContext, subfolder: &str) -> Result<Vec<String>> {
    Ok(ctx
        .resolver
        .list(subfolder)?
        .into_iter()
        .filter_map(|name| name.strip_suffix(ANNOTATION_SUFFIX).map(String::from))
        .collect())
}

/// Heartbeat times from an NSRR R-point table (`seconds` column)
pub(super) fn read_rpoints(path: &Path) -> Result<Vec<f64>> {
    let mut reader = open_csv(path)?;
    let headers = reader.headers()?.clone();
    let seconds_col = column(&headers, "seconds", path)?;

    let mut beats = Vec::new();
    for row in reader.records() {
        if let Some(t) = float_cell(&row?, seconds_col) {
            beats.push(t);
        }
    }
    Ok(beats)
}

pub(super) fn read_psg(ctx: &ReadContext, record_id: &str, ecg_channel: &str) -> Result<Psg> {
    let annotation_path = ctx.resolver.require(
        record_id,
        &format!("{}/{}{}", ANNOTATIONS_DIR, record_id, ANNOTATION_SUFFIX),
        "sleep stage annotations",
    )?;
    let annotation = read_nsrr_xml(&annotation_path)?;
    let grid = annotation.grid;
    let sleep_stages = annotation.sleep_stages();

    let source = ctx.options.heartbeats_source;
    let edf_relative = format!("{}/{}.edf", EDF_DIR, record_id);
    let locate_ecg = || -> Result<EcgHandle> {
        // Beat annotations only attach a waveform that is already on disk
        let path = if source == HeartbeatSource::Annotation {
            let path = ctx.resolver.local_path(&edf_relative);
            if !path.is_file() {
                return Err(SleepError::missing(record_id, "waveform"));
            }
            path
        } else {
            ctx.resolver.require(record_id, &edf_relative, "waveform")?
        };
        Ok(EcgHandle::edf(path, ecg_channel))
    };
    let read_beats = || -> Result<Vec<f64>> {
        let path = ctx.resolver.require(
            record_id,
            &format!("{}/{}-rpoint.csv", RPOINTS_DIR, record_id),
            "heartbeat annotations",
        )?;
        read_rpoints(&path)
    };
    let heartbeats = ctx.resolver.resolve_heartbeats(
        record_id,
        source,
        &ctx.cache,
        ctx.detector.as_deref(),
        locate_ecg,
        read_beats,
    )?;

    let edf_path = ctx.resolver.local_path(&edf_relative);
    let waveform_start = if edf_path.is_file() {
        match EdfReader::open(&edf_path) {
            Ok(reader) => {
                if heartbeats.ecg.is_some() && reader.signal_index(ecg_channel).is_none() {
                    return Err(SleepError::missing(
                        record_id,
                        format!("{} channel", ecg_channel),
                    ));
                }
                reader.header.start_datetime()
            }
            Err(e) if heartbeats.ecg.is_some() => return Err(e),
            Err(e) => {
                log::debug!("{}: unreadable waveform header: {}", record_id, e);
                None
            }
        }
    } else {
        None
    };
    let clock = ClockAlignment::reconcile(record_id, annotation.recording_start, waveform_start);

    Ok(Psg {
        sleep_stages,
        sleep_stage_duration: annotation.epoch_length,
        grid,
        clock,
        heartbeats,
    })
}
