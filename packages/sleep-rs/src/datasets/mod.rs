//! Per-dataset layouts: which files make up a record and how they are joined

mod mesa;
mod nsrr;
mod shhs;
mod slpdb;

pub use mesa::Mesa;
pub use shhs::Shhs;
pub use slpdb::Slpdb;

use std::sync::Arc;

use crate::cache::DerivedCache;
use crate::config::ReadOptions;
use crate::error::Result;
use crate::source::{HeartbeatDetector, SourceResolver};
use crate::types::{DatasetKind, Record};

/// Everything a dataset needs to assemble records, shared across workers
#[derive(Clone)]
pub struct ReadContext {
    pub options: ReadOptions,
    pub resolver: SourceResolver,
    pub cache: DerivedCache,
    pub detector: Option<Arc<dyn HeartbeatDetector>>,
}

/// A dataset layout
pub trait Dataset: Send + Sync {
    fn kind(&self) -> DatasetKind;

    /// Reject selector combinations the dataset cannot serve
    fn validate(&self, options: &ReadOptions) -> Result<()>;

    /// Every record id of the dataset, unfiltered
    fn list_records(&self, ctx: &ReadContext) -> Result<Vec<String>>;

    /// The part of a record id that record patterns are matched against
    fn pattern_key<'a>(&self, record_id: &'a str) -> &'a str {
        record_id
    }

    /// Load the tables shared by all records of one read
    fn open_session(&self, ctx: &ReadContext) -> Result<Box<dyn DatasetSession>>;
}

/// Per-read state of a dataset (metadata and overlap tables)
pub trait DatasetSession: Send + Sync {
    fn assemble(&self, ctx: &ReadContext, record_id: &str) -> Result<Record>;
}

pub fn dataset_for(kind: DatasetKind) -> Arc<dyn Dataset> {
    match kind {
        DatasetKind::Mesa => Arc::new(Mesa),
        DatasetKind::Shhs => Arc::new(Shhs),
        DatasetKind::Slpdb => Arc::new(Slpdb),
    }
}
