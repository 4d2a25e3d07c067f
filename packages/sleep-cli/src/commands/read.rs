use sleep_rs::{ReadOptions, Record};

use crate::cli::ReadArgs;
use crate::commands::{base_options, open_reader};
use crate::exit_codes;
use crate::output::{JsonLines, RecordSummary};

fn read_options(args: &ReadArgs) -> ReadOptions {
    ReadOptions {
        heartbeats_source: args.heartbeats,
        activity_source: args.activity,
        require_activity: !args.allow_missing_activity,
        activity_tolerance_epochs: args.activity_tolerance,
        jobs: args.jobs,
        ..base_options(&args.dataset)
    }
}

fn emit(out: &mut JsonLines, record: &Record, full: bool) -> Result<(), String> {
    if full {
        out.write(record)
    } else {
        out.write(&RecordSummary::new(record))
    }
}

pub fn execute(args: ReadArgs) -> i32 {
    let reader = match open_reader(&args.dataset, read_options(&args)) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };
    let records = match reader.records() {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::for_error(&e);
        }
    };
    let mut out = match JsonLines::open(args.output.as_deref(), args.compact) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    let (emitted, skipped) = if args.jobs == 1 {
        let mut records = records;
        for record in records.by_ref() {
            if let Err(e) = emit(&mut out, &record, args.full) {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
        (records.emitted(), records.skipped())
    } else {
        let attempted = records.remaining();
        let assembled = match records.collect_parallel() {
            Ok(assembled) => assembled,
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::for_error(&e);
            }
        };
        for record in &assembled {
            if let Err(e) = emit(&mut out, record, args.full) {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
        (assembled.len(), attempted - assembled.len())
    };

    if let Err(e) = out.finish() {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }
    if let Some(path) = &args.output {
        eprintln!("{} records written to {}", emitted, path);
    }

    if skipped > 0 {
        eprintln!("{} records skipped", skipped);
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::SUCCESS
    }
}
