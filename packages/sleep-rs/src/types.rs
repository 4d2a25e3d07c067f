use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SleepError};

/// Sleep stage codes shared by all dataset readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum SleepStage {
    Unscored = 0,
    N3 = 1,
    N2 = 2,
    N1 = 3,
    Rem = 4,
    Wake = 5,
}

impl SleepStage {
    pub const ALL: [SleepStage; 6] = [
        SleepStage::Unscored,
        SleepStage::N3,
        SleepStage::N2,
        SleepStage::N1,
        SleepStage::Rem,
        SleepStage::Wake,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Female,
    Male,
    #[default]
    Unknown,
}

/// Demographics joined onto a record by its subject id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectData {
    pub gender: Gender,
    /// Age in years
    pub age: Option<u32>,
    /// Weight in kg
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Mesa,
    Shhs,
    Slpdb,
}

impl DatasetKind {
    pub fn slug(self) -> &'static str {
        match self {
            DatasetKind::Mesa => "mesa",
            DatasetKind::Shhs => "shhs",
            DatasetKind::Slpdb => "slpdb",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        match slug.to_lowercase().as_str() {
            "mesa" => Some(DatasetKind::Mesa),
            "shhs" => Some(DatasetKind::Shhs),
            "slpdb" => Some(DatasetKind::Slpdb),
            _ => None,
        }
    }

    /// Datasets hosted by the NSRR (token-authenticated downloads)
    pub fn is_nsrr(self) -> bool {
        matches!(self, DatasetKind::Mesa | DatasetKind::Shhs)
    }
}

/// How a record's time series is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// Read from a raw per-record file (waveform channel or annotation table)
    RawChannel,
    /// Looked up in the derived-artifact cache, computed from raw on a miss
    CachedDerived,
    /// Raw actigraphy counts aligned through the overlap table
    ActigraphyRaw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatSource {
    /// Raw ECG channel, exposed as a lazy [`EcgHandle`]
    #[default]
    Ecg,
    /// Heartbeat times from the dataset's beat annotation files
    Annotation,
    /// Cached heartbeat times, detected from ECG on a cache miss
    Cached,
}

impl HeartbeatSource {
    pub fn kind(self) -> SourceKind {
        match self {
            HeartbeatSource::Ecg | HeartbeatSource::Annotation => SourceKind::RawChannel,
            HeartbeatSource::Cached => SourceKind::CachedDerived,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "ecg" => Ok(HeartbeatSource::Ecg),
            "annotation" => Ok(HeartbeatSource::Annotation),
            "cached" => Ok(HeartbeatSource::Cached),
            other => Err(SleepError::InvalidConfig(format!(
                "Unknown heartbeat source '{}'. Valid sources: ecg, annotation, cached",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivitySource {
    Actigraphy,
    Cached,
}

impl ActivitySource {
    pub fn kind(self) -> SourceKind {
        match self {
            ActivitySource::Actigraphy => SourceKind::ActigraphyRaw,
            ActivitySource::Cached => SourceKind::CachedDerived,
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "actigraphy" => Ok(ActivitySource::Actigraphy),
            "cached" => Ok(ActivitySource::Cached),
            other => Err(SleepError::InvalidConfig(format!(
                "Unknown activity source '{}'. Valid sources: actigraphy, cached",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Missing files are requested from the remote archive
    Online,
    /// Only files already present locally are used
    #[default]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum EcgFile {
    Edf { path: PathBuf },
    Wfdb { header: PathBuf },
}

/// Lazy reference to a record's ECG channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcgHandle {
    pub file: EcgFile,
    pub channel: String,
}

/// Samples of one ECG channel in physical units
#[derive(Debug, Clone)]
pub struct EcgSignal {
    pub samples: Vec<f64>,
    pub sampling_rate: f64,
}

impl EcgHandle {
    pub fn edf(path: PathBuf, channel: &str) -> Self {
        Self {
            file: EcgFile::Edf { path },
            channel: channel.to_string(),
        }
    }

    pub fn wfdb(header: PathBuf, channel: &str) -> Self {
        Self {
            file: EcgFile::Wfdb { header },
            channel: channel.to_string(),
        }
    }

    /// Read the channel from disk
    pub fn load(&self) -> Result<EcgSignal> {
        match &self.file {
            EcgFile::Edf { path } => {
                let mut reader = crate::edf::EdfReader::open(path)?;
                let (samples, sampling_rate) = reader.read_signal_by_label(&self.channel)?;
                Ok(EcgSignal {
                    samples,
                    sampling_rate,
                })
            }
            EcgFile::Wfdb { header } => {
                let record = crate::wfdb::WfdbHeader::open(header)?;
                let samples = record.read_signal(&self.channel)?;
                Ok(EcgSignal {
                    samples,
                    sampling_rate: record.sampling_rate,
                })
            }
        }
    }
}

/// One subject night, normalized across datasets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub sleep_stages: Vec<SleepStage>,
    /// Seconds per epoch
    pub sleep_stage_duration: u32,
    pub recording_start_time: Option<NaiveTime>,
    /// Heartbeat times in seconds since recording start
    pub heartbeats: Option<Vec<f64>>,
    pub ecg: Option<EcgHandle>,
    /// One count per sleep stage epoch, NaN where unknown
    pub activity_counts: Option<Vec<f64>>,
    pub subject_data: SubjectData,
}

impl Record {
    /// Activity counts must map 1:1 onto the sleep stage epochs.
    pub fn check_alignment(&self) -> Result<()> {
        if let Some(counts) = &self.activity_counts {
            if counts.len() != self.sleep_stages.len() {
                return Err(SleepError::Alignment(format!(
                    "{} activity counts for {} sleep stage epochs",
                    counts.len(),
                    self.sleep_stages.len()
                )));
            }
        }
        Ok(())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.sleep_stages.len() as f64 * self.sleep_stage_duration as f64
    }
}
