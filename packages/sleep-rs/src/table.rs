//! Delimited tables addressed by header name

use std::fs::File;
use std::path::Path;

use chrono::NaiveTime;
use csv::StringRecord;

use crate::error::{Result, SleepError};

pub(crate) fn open_csv(path: &Path) -> Result<csv::Reader<File>> {
    if !path.is_file() {
        return Err(SleepError::FileNotFound(path.display().to_string()));
    }
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?)
}

/// Index of a named column, matched case-insensitively
pub(crate) fn column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| {
            SleepError::ParseError(format!("{}: no '{}' column", path.display(), name))
        })
}

/// Non-empty cell text
pub(crate) fn cell(row: &StringRecord, index: usize) -> Option<&str> {
    row.get(index).filter(|v| !v.is_empty())
}

/// Integer cell, accepting float notation such as `77.0`
pub(crate) fn int_cell(row: &StringRecord, index: usize) -> Option<i64> {
    let value = cell(row, index)?;
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

pub(crate) fn float_cell(row: &StringRecord, index: usize) -> Option<f64> {
    cell(row, index)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) fn time_cell(row: &StringRecord, index: usize) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(cell(row, index)?, "%H:%M:%S").ok()
}
