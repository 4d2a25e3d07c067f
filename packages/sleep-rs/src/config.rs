use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::download::DownloadConfig;
use crate::types::{ActivitySource, HeartbeatSource, Mode};

/// Selection and resolution settings for one read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Parent directory of the per-dataset directories
    pub data_dir: PathBuf,
    /// Shell-style pattern over record ids (dataset-specific part)
    pub records_pattern: String,
    pub heartbeats_source: HeartbeatSource,
    pub activity_source: Option<ActivitySource>,
    /// Skip records whose activity counts are unavailable; when false they are
    /// yielded without counts
    pub require_activity: bool,
    /// Epochs at the end of a record allowed to lack actigraphy
    pub activity_tolerance_epochs: usize,
    pub mode: Mode,
    /// Workers for parallel assembly; 0 uses all cores
    pub jobs: usize,
    pub download: DownloadConfig,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            records_pattern: "*".to_string(),
            heartbeats_source: HeartbeatSource::default(),
            activity_source: None,
            require_activity: true,
            activity_tolerance_epochs: 0,
            mode: Mode::default(),
            jobs: 1,
            download: DownloadConfig::default(),
        }
    }
}

/// `~/.sleepecg/datasets`, or a relative `.sleepecg/datasets` without a home directory
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".sleepecg")
        .join("datasets")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ReadOptions::default();
        assert_eq!(options.records_pattern, "*");
        assert_eq!(options.heartbeats_source, HeartbeatSource::Ecg);
        assert_eq!(options.mode, Mode::Offline);
        assert!(options.require_activity);
        assert!(options.data_dir.ends_with(".sleepecg/datasets"));
    }

    #[test]
    fn test_partial_json() {
        let options: ReadOptions =
            serde_json::from_str(r#"{"records_pattern": "00*", "activity_source": "cached"}"#)
                .unwrap();
        assert_eq!(options.records_pattern, "00*");
        assert_eq!(options.activity_source, Some(ActivitySource::Cached));
        assert_eq!(options.jobs, 1);
    }
}
