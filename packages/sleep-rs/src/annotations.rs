use std::path::Path;

use chrono::NaiveTime;
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;

use crate::clock::EpochGrid;
use crate::error::{Result, SleepError};
use crate::types::SleepStage;

const RECORDING_START_CONCEPT: &str = "Recording Start Time";

/// A scored interval as written in the source document, before rasterization
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEvent {
    pub concept: String,
    /// Seconds since the annotation's recording start
    pub start: f64,
    pub duration: f64,
}

impl AnnotationEvent {
    fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.start + self.duration
    }
}

/// Free-text stage label dictionaries, one per annotation dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageVocabulary {
    /// NSRR `EventConcept` values such as `Stage 2 sleep|2`
    Nsrr,
    /// PhysioNet slpdb aux labels such as `2` or `W LA`
    Slpdb,
}

impl StageVocabulary {
    /// Map a label to its stage; unrecognized labels are unscored
    pub fn stage(self, label: &str) -> SleepStage {
        match self {
            StageVocabulary::Nsrr => match label.trim() {
                "Wake|0" => SleepStage::Wake,
                "Stage 1 sleep|1" => SleepStage::N1,
                "Stage 2 sleep|2" => SleepStage::N2,
                "Stage 3 sleep|3" | "Stage 4 sleep|4" => SleepStage::N3,
                "REM sleep|5" => SleepStage::Rem,
                _ => SleepStage::Unscored,
            },
            StageVocabulary::Slpdb => match label.split_whitespace().next() {
                Some("W") => SleepStage::Wake,
                Some("1") => SleepStage::N1,
                Some("2") => SleepStage::N2,
                Some("3") | Some("4") => SleepStage::N3,
                Some("R") => SleepStage::Rem,
                _ => SleepStage::Unscored,
            },
        }
    }
}

/// Parsed NSRR `PSGAnnotation` document
#[derive(Debug, Clone)]
pub struct NsrrAnnotation {
    /// Whole seconds per epoch
    pub epoch_length: u32,
    pub recording_start: Option<NaiveTime>,
    /// Duration of the recording start event, i.e. the record length in seconds
    pub total_duration: f64,
    pub grid: EpochGrid,
    pub stage_events: Vec<AnnotationEvent>,
}

impl NsrrAnnotation {
    pub fn sleep_stages(&self) -> Vec<SleepStage> {
        rasterize(&self.stage_events, &self.grid, StageVocabulary::Nsrr)
    }
}

/// Accumulates the children of one `ScoredEvent` element
#[derive(Default)]
struct ScoredEventFields {
    event_type: String,
    concept: String,
    start: Option<String>,
    duration: Option<String>,
    clock_time: Option<String>,
}

fn parse_seconds(value: Option<&str>, what: &str) -> Result<f64> {
    let value = value.ok_or_else(|| SleepError::InvalidAnnotation(format!("missing {}", what)))?;
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite())
        .ok_or_else(|| SleepError::InvalidAnnotation(format!("bad {} '{}'", what, value)))
}

/// NSRR clock times look like `01.01.85 20.29.59`
fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    let time = value.split_whitespace().last()?;
    NaiveTime::parse_from_str(time, "%H.%M.%S")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .ok()
}

/// Parse an NSRR XML annotation document
pub fn parse_nsrr_xml(xml: &str) -> Result<NsrrAnnotation> {
    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut epoch_length: Option<f64> = None;
    let mut recording_start: Option<(Option<NaiveTime>, f64)> = None;
    let mut stage_events = Vec::new();

    let mut saw_root = false;
    let mut current: Option<ScoredEventFields> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                match e.name().as_ref() {
                    b"PSGAnnotation" => saw_root = true,
                    b"ScoredEvent" => current = Some(ScoredEventFields::default()),
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Text(e)) => {
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::End(e)) => {
                let name = e.name();
                if name.as_ref() == b"ScoredEvent" {
                    if let Some(fields) = current.take() {
                        if fields.concept == RECORDING_START_CONCEPT {
                            let duration = parse_seconds(fields.duration.as_deref(), "Duration")?;
                            let clock = fields.clock_time.as_deref().and_then(parse_clock_time);
                            recording_start = Some((clock, duration));
                        } else if fields.event_type.starts_with("Stages") {
                            stage_events.push(AnnotationEvent {
                                start: parse_seconds(fields.start.as_deref(), "Start")?,
                                duration: parse_seconds(fields.duration.as_deref(), "Duration")?,
                                concept: fields.concept,
                            });
                        }
                    }
                } else if name.as_ref() == b"EpochLength" {
                    epoch_length = Some(parse_seconds(Some(text.as_str()), "EpochLength")?);
                } else if let Some(fields) = current.as_mut() {
                    let value = text.trim().to_string();
                    match name.as_ref() {
                        b"EventType" => fields.event_type = value,
                        b"EventConcept" => fields.concept = value,
                        b"Start" => fields.start = Some(value),
                        b"Duration" => fields.duration = Some(value),
                        b"ClockTime" => fields.clock_time = Some(value),
                        _ => {}
                    }
                }
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"PSGAnnotation" {
                    saw_root = true;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SleepError::InvalidAnnotation(format!(
                    "XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(SleepError::InvalidAnnotation(
            "missing PSGAnnotation root element".to_string(),
        ));
    }
    let (recording_start, total_duration) = recording_start.ok_or_else(|| {
        SleepError::InvalidAnnotation(format!("no '{}' event", RECORDING_START_CONCEPT))
    })?;
    let epoch_length = epoch_length.unwrap_or(30.0);
    if epoch_length < 1.0 || epoch_length.fract() != 0.0 || epoch_length > u32::MAX as f64 {
        return Err(SleepError::InvalidAnnotation(format!(
            "epoch length {} is not a whole number of seconds",
            epoch_length
        )));
    }
    if total_duration <= 0.0 {
        return Err(SleepError::InvalidAnnotation(format!(
            "non-positive recording duration {}",
            total_duration
        )));
    }
    let grid = EpochGrid::covering(total_duration, epoch_length)?;

    Ok(NsrrAnnotation {
        epoch_length: epoch_length as u32,
        recording_start,
        total_duration,
        grid,
        stage_events,
    })
}

pub fn read_nsrr_xml(path: &Path) -> Result<NsrrAnnotation> {
    if !path.is_file() {
        return Err(SleepError::FileNotFound(path.display().to_string()));
    }
    let xml = std::fs::read_to_string(path)?;
    parse_nsrr_xml(&xml).map_err(|e| match e {
        SleepError::InvalidAnnotation(msg) => {
            SleepError::InvalidAnnotation(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })
}

/// Assign each epoch the stage of the event covering its midpoint.
///
/// Events may have any length and need not line up with the grid. An epoch whose
/// midpoint no event covers is explicitly `SleepStage::Unscored`. Where events
/// overlap, the one starting last wins.
pub fn rasterize(
    events: &[AnnotationEvent],
    grid: &EpochGrid,
    vocabulary: StageVocabulary,
) -> Vec<SleepStage> {
    let mut sorted: Vec<&AnnotationEvent> = events.iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    (0..grid.num_epochs)
        .map(|i| {
            let midpoint = grid.epoch_midpoint(i);
            let candidates = sorted.partition_point(|e| e.start <= midpoint);
            sorted[..candidates]
                .iter()
                .rev()
                .find(|e| e.contains(midpoint))
                .map(|e| vocabulary.stage(&e.concept))
                .unwrap_or(SleepStage::Unscored)
        })
        .collect()
}
