use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::actigraphy::SyncedCounts;
use crate::cache::{DerivationKind, DerivedCache};
use crate::download::Downloader;
use crate::error::{Result, SleepError};
use crate::types::{
    ActivitySource, DatasetKind, EcgHandle, EcgSignal, HeartbeatSource, Mode, SourceKind,
};

/// R-peak detection, supplied by the caller for `HeartbeatSource::Cached`
pub trait HeartbeatDetector: Send + Sync {
    /// Heartbeat times in seconds since the first sample
    fn detect(&self, ecg: &EcgSignal) -> Result<Vec<f64>>;
}

/// Heartbeat data resolved for one record
#[derive(Debug, Clone, Default)]
pub struct ResolvedHeartbeats {
    pub heartbeats: Option<Vec<f64>>,
    pub ecg: Option<EcgHandle>,
}

/// Locates per-record files of one dataset, locally or through a [`Downloader`]
#[derive(Clone)]
pub struct SourceResolver {
    dataset: DatasetKind,
    root: PathBuf,
    mode: Mode,
    downloader: Option<Arc<dyn Downloader>>,
}

impl SourceResolver {
    pub fn new(
        dataset: DatasetKind,
        root: PathBuf,
        mode: Mode,
        downloader: Option<Arc<dyn Downloader>>,
    ) -> Self {
        Self {
            dataset,
            root,
            mode,
            downloader,
        }
    }

    pub fn dataset(&self) -> DatasetKind {
        self.dataset
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn local_path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    fn online_downloader(&self) -> Option<&dyn Downloader> {
        match self.mode {
            Mode::Online => self.downloader.as_deref(),
            Mode::Offline => None,
        }
    }

    /// Local path of a mandatory file, downloaded first in online mode
    pub fn require(&self, record_id: &str, relative: &str, source_name: &str) -> Result<PathBuf> {
        let path = self.local_path(relative);
        if path.is_file() {
            return Ok(path);
        }
        match self.online_downloader() {
            Some(downloader) => {
                downloader
                    .fetch(self.dataset, relative, &path)
                    .map_err(|e| {
                        log::debug!("{}: fetching {} failed: {}", record_id, relative, e);
                        SleepError::missing(record_id, source_name)
                    })?;
                Ok(path)
            }
            None => Err(SleepError::missing(record_id, source_name)),
        }
    }

    /// Like [`Self::require`], but absence is `Ok(None)`
    pub fn optional(&self, record_id: &str, relative: &str) -> Result<Option<PathBuf>> {
        match self.require(record_id, relative, relative) {
            Ok(path) => Ok(Some(path)),
            Err(e) if e.is_absence() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sorted file names in a dataset subfolder
    pub fn list(&self, subfolder: &str) -> Result<Vec<String>> {
        let mut names = match self.online_downloader() {
            Some(downloader) => downloader.list(self.dataset, subfolder)?,
            None => {
                let dir = self.local_path(subfolder);
                if !dir.is_dir() {
                    return Ok(Vec::new());
                }
                let mut names = Vec::new();
                for entry in fs::read_dir(&dir)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        names.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                names
            }
        };
        names.sort();
        Ok(names)
    }

    /// Newest file in `subfolder` whose name matches `pattern`, fetched if only
    /// available remotely
    pub fn find_table(&self, subfolder: &str, pattern: &str) -> Result<PathBuf> {
        let matcher = glob::Pattern::new(pattern)
            .map_err(|e| SleepError::InvalidConfig(format!("Invalid pattern '{}': {}", pattern, e)))?;
        let name = self
            .list(subfolder)?
            .into_iter()
            .filter(|name| matcher.matches(name))
            .last()
            .ok_or_else(|| {
                SleepError::FileNotFound(format!("{}/{}", self.local_path(subfolder).display(), pattern))
            })?;
        let relative = format!("{}/{}", subfolder, name);
        self.require(&relative, &relative, &relative)
    }

    /// Heartbeat times and/or ECG reference according to `source`.
    ///
    /// `ecg` locates the waveform and `beat_annotations` reads the dataset's beat
    /// annotation file; each runs only if `source` needs it.
    pub fn resolve_heartbeats<E, B>(
        &self,
        record_id: &str,
        source: HeartbeatSource,
        cache: &DerivedCache,
        detector: Option<&dyn HeartbeatDetector>,
        ecg: E,
        beat_annotations: B,
    ) -> Result<ResolvedHeartbeats>
    where
        E: Fn() -> Result<EcgHandle>,
        B: FnOnce() -> Result<Vec<f64>>,
    {
        match (source.kind(), source) {
            (SourceKind::RawChannel, HeartbeatSource::Ecg) => Ok(ResolvedHeartbeats {
                heartbeats: None,
                ecg: Some(ecg()?),
            }),
            (SourceKind::RawChannel, _) => {
                let heartbeats = beat_annotations()?;
                let ecg = match ecg() {
                    Ok(handle) => Some(handle),
                    Err(e) if e.is_absence() => None,
                    Err(e) => return Err(e),
                };
                Ok(ResolvedHeartbeats {
                    heartbeats: Some(heartbeats),
                    ecg,
                })
            }
            (SourceKind::CachedDerived, _) => {
                let heartbeats =
                    cache.get_or_insert_with(record_id, DerivationKind::Heartbeats, || {
                        let detector =
                            detector.ok_or_else(|| SleepError::missing(record_id, "cached heartbeats"))?;
                        let signal = ecg()?.load()?;
                        detector.detect(&signal)
                    })?;
                Ok(ResolvedHeartbeats {
                    heartbeats: Some(heartbeats),
                    ecg: None,
                })
            }
            (SourceKind::ActigraphyRaw, _) => Err(SleepError::InvalidConfig(format!(
                "{:?} is not a heartbeat source",
                source
            ))),
        }
    }

    /// Activity counts according to `source`, `None` when not requested.
    ///
    /// Raw actigraphy is recomputed with `compute`; the cached source reads the cache
    /// and falls back to `compute` on a miss. Counts with padded epochs are never
    /// stored. When the activity source is not `required`, absence leaves the counts out
    /// instead of failing.
    pub fn resolve_activity<F>(
        &self,
        record_id: &str,
        source: Option<ActivitySource>,
        required: bool,
        cache: &DerivedCache,
        compute: F,
    ) -> Result<Option<Vec<f64>>>
    where
        F: FnOnce() -> Result<SyncedCounts>,
    {
        let Some(source) = source else {
            return Ok(None);
        };
        let store = |synced: SyncedCounts| -> Vec<f64> {
            if !synced.is_complete() {
                log::debug!(
                    "{}: not caching activity counts with {} padded epochs",
                    record_id,
                    synced.padded_epochs
                );
            } else if let Err(e) =
                cache.put(record_id, DerivationKind::ActivityCounts, &synced.counts)
            {
                log::warn!("{}: could not cache activity counts: {}", record_id, e);
            }
            synced.counts
        };
        let resolved = match source.kind() {
            SourceKind::ActigraphyRaw => compute().map(store),
            SourceKind::CachedDerived => match cache.get(record_id, DerivationKind::ActivityCounts) {
                Ok(Some(counts)) => Ok(counts),
                Ok(None) => compute().map(store),
                Err(e) => Err(e),
            },
            SourceKind::RawChannel => Err(SleepError::InvalidConfig(format!(
                "{:?} is not an activity source",
                source
            ))),
        };
        match resolved {
            Ok(counts) => Ok(Some(counts)),
            Err(e) if e.is_absence() && !required => {
                log::debug!("{}: no activity counts: {}", record_id, e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
