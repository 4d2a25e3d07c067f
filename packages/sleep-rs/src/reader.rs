use std::sync::Arc;

use rayon::prelude::*;

use crate::cache::DerivedCache;
use crate::config::ReadOptions;
use crate::datasets::{dataset_for, Dataset, DatasetSession, ReadContext};
use crate::download::{Downloader, HttpDownloader};
use crate::error::{Result, SleepError};
use crate::source::{HeartbeatDetector, SourceResolver};
use crate::types::{DatasetKind, Mode, Record};

/// Assembles normalized [`Record`]s from one dataset
pub struct RecordReader {
    dataset: Arc<dyn Dataset>,
    ctx: Arc<ReadContext>,
    pattern: glob::Pattern,
}

pub struct RecordReaderBuilder {
    kind: DatasetKind,
    options: ReadOptions,
    downloader: Option<Arc<dyn Downloader>>,
    detector: Option<Arc<dyn HeartbeatDetector>>,
}

impl RecordReaderBuilder {
    /// Remote access for online mode, replacing the default HTTP downloader
    pub fn downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// R-peak detector used to fill the heartbeat cache
    pub fn detector(mut self, detector: Arc<dyn HeartbeatDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Validate the selector combination; configuration errors surface here, before
    /// any record is read.
    pub fn build(self) -> Result<RecordReader> {
        let dataset = dataset_for(self.kind);
        dataset.validate(&self.options)?;

        let pattern = glob::Pattern::new(&self.options.records_pattern).map_err(|e| {
            SleepError::InvalidConfig(format!(
                "Invalid records pattern '{}': {}",
                self.options.records_pattern, e
            ))
        })?;

        let downloader = match (self.options.mode, self.downloader) {
            (Mode::Offline, _) => None,
            (Mode::Online, Some(downloader)) => Some(downloader),
            (Mode::Online, None) => {
                if self.kind.is_nsrr() && self.options.download.nsrr_token.is_none() {
                    return Err(SleepError::InvalidConfig(format!(
                        "Online access to {} requires an NSRR token",
                        self.kind.slug()
                    )));
                }
                let http: Arc<dyn Downloader> =
                    Arc::new(HttpDownloader::new(self.options.download.clone())?);
                Some(http)
            }
        };

        let root = self.options.data_dir.join(self.kind.slug());
        if self.options.mode == Mode::Offline && !root.is_dir() {
            log::warn!("Dataset directory {} does not exist", root.display());
        }

        let ctx = ReadContext {
            resolver: SourceResolver::new(self.kind, root.clone(), self.options.mode, downloader),
            cache: DerivedCache::for_dataset(&root),
            detector: self.detector,
            options: self.options,
        };

        Ok(RecordReader {
            dataset,
            ctx: Arc::new(ctx),
            pattern,
        })
    }
}

impl RecordReader {
    pub fn builder(dataset: DatasetKind, options: ReadOptions) -> RecordReaderBuilder {
        RecordReaderBuilder {
            kind: dataset,
            options,
            downloader: None,
            detector: None,
        }
    }

    pub fn new(dataset: DatasetKind, options: ReadOptions) -> Result<Self> {
        Self::builder(dataset, options).build()
    }

    pub fn dataset(&self) -> DatasetKind {
        self.dataset.kind()
    }

    pub fn options(&self) -> &ReadOptions {
        &self.ctx.options
    }

    pub fn cache(&self) -> &DerivedCache {
        &self.ctx.cache
    }

    /// Record ids matching the records pattern, sorted
    pub fn record_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self
            .dataset
            .list_records(&self.ctx)?
            .into_iter()
            .filter(|id| self.pattern.matches(self.dataset.pattern_key(id)))
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// A fresh lazy sequence over the matching records.
    ///
    /// Each call lists the dataset again and reloads its tables, so re-invoking
    /// yields the same records for an unchanged dataset.
    pub fn records(&self) -> Result<Records> {
        let ids = self.record_ids()?;
        let session: Arc<dyn DatasetSession> = Arc::from(self.dataset.open_session(&self.ctx)?);
        log::info!(
            "Reading {} {} records matching '{}'",
            ids.len(),
            self.dataset.kind().slug(),
            self.ctx.options.records_pattern
        );
        Ok(Records {
            ctx: Arc::clone(&self.ctx),
            state: RecordsState::Pending {
                ids: ids.into_iter(),
                session,
            },
            emitted: 0,
            skipped: 0,
        })
    }
}

enum RecordsState {
    Pending {
        ids: std::vec::IntoIter<String>,
        session: Arc<dyn DatasetSession>,
    },
    Exhausted,
}

/// Lazy sequence of assembled records.
///
/// Records that cannot be assembled are logged and left out. Yielded records are not
/// retained.
pub struct Records {
    ctx: Arc<ReadContext>,
    state: RecordsState,
    emitted: usize,
    skipped: usize,
}

fn assemble(session: &dyn DatasetSession, ctx: &ReadContext, record_id: &str) -> Option<Record> {
    match session.assemble(ctx, record_id) {
        Ok(record) => Some(record),
        Err(e) => {
            log::warn!("Skipping record {}: {}", record_id, e);
            None
        }
    }
}

impl Records {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, RecordsState::Exhausted)
    }

    /// Ids not yet attempted
    pub fn remaining(&self) -> usize {
        match &self.state {
            RecordsState::Pending { ids, .. } => ids.len(),
            RecordsState::Exhausted => 0,
        }
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Records left out so far because they could not be assembled
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Assemble all remaining records on `options.jobs` workers, in id order
    pub fn collect_parallel(mut self) -> Result<Vec<Record>> {
        let (ids, session) = match std::mem::replace(&mut self.state, RecordsState::Exhausted) {
            RecordsState::Pending { ids, session } => (ids.collect::<Vec<_>>(), session),
            RecordsState::Exhausted => return Ok(Vec::new()),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.ctx.options.jobs)
            .build()
            .map_err(|e| SleepError::InvalidConfig(format!("Failed to create worker pool: {}", e)))?;

        let ctx = &self.ctx;
        let records: Vec<Record> = pool.install(|| {
            ids.par_iter()
                .filter_map(|id| assemble(session.as_ref(), ctx, id))
                .collect()
        });
        log::info!(
            "Assembled {} records, skipped {}",
            records.len(),
            ids.len() - records.len()
        );
        Ok(records)
    }
}

impl Iterator for Records {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            let RecordsState::Pending { ids, session } = &mut self.state else {
                return None;
            };
            let Some(id) = ids.next() else {
                log::info!(
                    "Assembled {} records, skipped {}",
                    self.emitted,
                    self.skipped
                );
                self.state = RecordsState::Exhausted;
                return None;
            };
            match assemble(session.as_ref(), &self.ctx, &id) {
                Some(record) => {
                    self.emitted += 1;
                    return Some(record);
                }
                None => self.skipped += 1,
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

fn read(kind: DatasetKind, options: ReadOptions) -> Result<Records> {
    RecordReader::new(kind, options)?.records()
}

/// Records of the MESA sleep study
pub fn read_mesa(options: ReadOptions) -> Result<Records> {
    read(DatasetKind::Mesa, options)
}

/// Records of both SHHS visits
pub fn read_shhs(options: ReadOptions) -> Result<Records> {
    read(DatasetKind::Shhs, options)
}

/// Records of the MIT-BIH Polysomnographic Database
pub fn read_slpdb(options: ReadOptions) -> Result<Records> {
    read(DatasetKind::Slpdb, options)
}
