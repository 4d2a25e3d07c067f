pub mod actigraphy;
pub mod annotations;
pub mod cache;
pub mod clock;
pub mod config;
pub mod datasets;
pub mod download;
pub mod edf;
pub mod error;
pub mod metadata;
pub mod mmap_utils;
pub mod npy;
pub mod reader;
pub mod source;
mod table;
pub mod types;
pub mod wfdb;

pub use types::*;
pub use actigraphy::ACTIVITY_COUNT_UNKNOWN;
pub use cache::{DerivationKind, DerivedCache};
pub use config::ReadOptions;
pub use download::{DownloadConfig, Downloader, HttpDownloader};
pub use error::{SleepError, Result};
pub use reader::{read_mesa, read_shhs, read_slpdb, RecordReader, RecordReaderBuilder, Records};
pub use source::HeartbeatDetector;
