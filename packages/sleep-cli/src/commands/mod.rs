pub mod cache;
pub mod list;
pub mod read;

use sleep_rs::{DownloadConfig, Mode, ReadOptions, RecordReader, Result};

use crate::cli::DatasetArgs;

/// Read options shared by every subcommand
pub fn base_options(args: &DatasetArgs) -> ReadOptions {
    ReadOptions {
        data_dir: args
            .data_dir
            .clone()
            .unwrap_or_else(sleep_rs::config::default_data_dir),
        records_pattern: args.pattern.clone(),
        mode: if args.online { Mode::Online } else { Mode::Offline },
        download: DownloadConfig {
            nsrr_token: args.nsrr_token.clone(),
            ..DownloadConfig::default()
        },
        ..ReadOptions::default()
    }
}

pub fn open_reader(args: &DatasetArgs, options: ReadOptions) -> Result<RecordReader> {
    log::debug!(
        "Opening {} under {}",
        args.dataset.slug(),
        options.data_dir.display()
    );
    RecordReader::new(args.dataset, options)
}
