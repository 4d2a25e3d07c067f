use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use sleep_rs::{ActivitySource, DatasetKind, DerivationKind, HeartbeatSource};

#[derive(Parser)]
#[command(
    name = "sleepread",
    version,
    about = "Read sleep records from the MESA, SHHS and SLPDB datasets",
    long_about = "Assemble per-night sleep records (sleep stages, heartbeats or ECG, \
                  actigraphy counts, demographics) from local or downloaded \
                  polysomnography datasets.\n\
                  Datasets live under $SLEEP_DATA_DIR/<dataset> (default ~/.sleepecg/datasets)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Assemble records and print one JSON summary per record
    Read(ReadArgs),
    /// List the record ids a read would attempt
    List(ListArgs),
    /// Manage cached derived arrays
    Cache(CacheArgs),
}

#[derive(Args, Clone)]
pub struct DatasetArgs {
    /// Dataset to read (mesa, shhs, slpdb)
    #[arg(long, value_parser = parse_dataset)]
    pub dataset: DatasetKind,

    /// Parent directory of the dataset directories
    #[arg(long, env = "SLEEP_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Shell-style pattern over record ids, e.g. "0*" for MESA or "shhs2-*" for SHHS
    #[arg(long, default_value = "*")]
    pub pattern: String,

    /// Request missing files from NSRR / PhysioNet
    #[arg(long, default_value_t = false)]
    pub online: bool,

    /// NSRR download token (MESA, SHHS)
    #[arg(long, env = "NSRR_TOKEN", hide_env_values = true)]
    pub nsrr_token: Option<String>,
}

#[derive(Args)]
pub struct ReadArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Heartbeat source (ecg, annotation, cached)
    #[arg(long, default_value = "ecg", value_parser = parse_heartbeats)]
    pub heartbeats: HeartbeatSource,

    /// Activity count source (actigraphy, cached); MESA only
    #[arg(long, value_parser = parse_activity)]
    pub activity: Option<ActivitySource>,

    /// Keep records without activity counts instead of skipping them
    #[arg(long, default_value_t = false)]
    pub allow_missing_activity: bool,

    /// Epochs allowed to lack actigraphy before a record is skipped
    #[arg(long, default_value_t = 0)]
    pub activity_tolerance: usize,

    /// Parallel workers (0 = all cores)
    #[arg(short, long, default_value_t = 1)]
    pub jobs: usize,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Include the full stage and heartbeat arrays
    #[arg(long, default_value_t = false)]
    pub full: bool,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Delete every cached array of one kind
    Clear(CacheClearArgs),
}

#[derive(Args)]
pub struct CacheClearArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Cache kind (activity-counts, heartbeats)
    #[arg(long, value_parser = parse_kind)]
    pub kind: DerivationKind,
}

pub fn parse_dataset(s: &str) -> Result<DatasetKind, String> {
    DatasetKind::from_slug(s)
        .ok_or_else(|| format!("Unknown dataset '{}'. Valid datasets: mesa, shhs, slpdb", s))
}

fn parse_heartbeats(s: &str) -> Result<HeartbeatSource, String> {
    HeartbeatSource::parse(s).map_err(|e| e.to_string())
}

fn parse_activity(s: &str) -> Result<ActivitySource, String> {
    ActivitySource::parse(s).map_err(|e| e.to_string())
}

fn parse_kind(s: &str) -> Result<DerivationKind, String> {
    DerivationKind::parse(s).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_dataset() {
        assert_eq!(parse_dataset("MESA").unwrap(), DatasetKind::Mesa);
        assert_eq!(parse_dataset("slpdb").unwrap(), DatasetKind::Slpdb);
        assert!(parse_dataset("sleep-edf").is_err());
    }

    #[test]
    fn test_read_args() {
        let cli = Cli::try_parse_from([
            "sleepread",
            "read",
            "--dataset",
            "mesa",
            "--data-dir",
            "/data",
            "--heartbeats",
            "annotation",
            "--activity",
            "cached",
            "-j",
            "4",
        ])
        .unwrap();
        let Command::Read(args) = cli.command else {
            panic!("expected read");
        };
        assert_eq!(args.dataset.dataset, DatasetKind::Mesa);
        assert_eq!(args.heartbeats, HeartbeatSource::Annotation);
        assert_eq!(args.activity, Some(ActivitySource::Cached));
        assert_eq!(args.jobs, 4);
        assert_eq!(args.dataset.pattern, "*");
    }

    #[test]
    fn test_unknown_heartbeat_source() {
        assert!(Cli::try_parse_from([
            "sleepread",
            "read",
            "--dataset",
            "mesa",
            "--heartbeats",
            "ppg"
        ])
        .is_err());
    }
}
