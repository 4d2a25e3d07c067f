use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SleepError};
use crate::npy;

/// Kinds of per-record arrays kept in the derived-artifact cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DerivationKind {
    /// Actigraphy counts aligned to the sleep stage epochs
    ActivityCounts,
    /// Heartbeat times in seconds
    Heartbeats,
}

impl DerivationKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            DerivationKind::ActivityCounts => "activity_counts",
            DerivationKind::Heartbeats => "heartbeats",
        }
    }

    fn file_name(self, record_id: &str) -> String {
        match self {
            DerivationKind::ActivityCounts => format!("{}-activity-counts.npy", record_id),
            DerivationKind::Heartbeats => format!("{}.npy", record_id),
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().replace('_', "-").as_str() {
            "activity-counts" => Ok(DerivationKind::ActivityCounts),
            "heartbeats" => Ok(DerivationKind::Heartbeats),
            other => Err(SleepError::InvalidConfig(format!(
                "Unknown cache kind '{}'. Valid kinds: activity-counts, heartbeats",
                other
            ))),
        }
    }
}

/// Write `bytes` to a unique temp file next to `path`, then rename it into place.
/// Readers see either the previous file or the complete new one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SleepError::InvalidConfig(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

/// On-disk store of derived per-record arrays under `<dataset>/preprocessed/`.
///
/// Entries are keyed by record id and derivation kind and live until removed
/// explicitly. Record ids may contain `/` (SHHS visits); those become subdirectories.
#[derive(Debug, Clone)]
pub struct DerivedCache {
    root: PathBuf,
}

impl DerivedCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Cache rooted at `<dataset_dir>/preprocessed`
    pub fn for_dataset(dataset_dir: &Path) -> Self {
        Self::new(dataset_dir.join("preprocessed"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, record_id: &str, kind: DerivationKind) -> PathBuf {
        self.root.join(kind.dir_name()).join(kind.file_name(record_id))
    }

    /// Cached array, or `None` on a miss
    pub fn get(&self, record_id: &str, kind: DerivationKind) -> Result<Option<Vec<f64>>> {
        let path = self.path(record_id, kind);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let values = npy::decode(&bytes)
            .map_err(|e| SleepError::ParseError(format!("{}: {}", path.display(), e)))?;
        log::debug!("Cache hit: {}", path.display());
        Ok(Some(values))
    }

    /// Store an array, replacing any previous entry
    pub fn put(&self, record_id: &str, kind: DerivationKind, values: &[f64]) -> Result<()> {
        let path = self.path(record_id, kind);
        write_atomic(&path, &npy::encode_f64(values))?;
        log::debug!("Cached {} values at {}", values.len(), path.display());
        Ok(())
    }

    /// Cached array, computing and storing it on a miss
    pub fn get_or_insert_with<F>(
        &self,
        record_id: &str,
        kind: DerivationKind,
        compute: F,
    ) -> Result<Vec<f64>>
    where
        F: FnOnce() -> Result<Vec<f64>>,
    {
        if let Some(values) = self.get(record_id, kind)? {
            return Ok(values);
        }
        let values = compute()?;
        self.put(record_id, kind, &values)?;
        Ok(values)
    }

    /// Returns whether an entry existed
    pub fn remove(&self, record_id: &str, kind: DerivationKind) -> Result<bool> {
        match fs::remove_file(self.path(record_id, kind)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every entry of one kind; returns the number of files removed
    pub fn clear(&self, kind: DerivationKind) -> Result<usize> {
        let dir = self.root.join(kind.dir_name());
        if !dir.is_dir() {
            return Ok(0);
        }
        let removed = count_files(&dir)?;
        fs::remove_dir_all(&dir)?;
        log::info!("Removed {} cached {} entries", removed, kind.dir_name());
        Ok(removed)
    }
}

fn count_files(dir: &Path) -> Result<usize> {
    let mut count = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            count += count_files(&path)?;
        } else {
            count += 1;
        }
    }
    Ok(count)
}
