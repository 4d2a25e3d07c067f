use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveTime;

use crate::clock::{signed_offset, EpochGrid};
use crate::error::{Result, SleepError};
use crate::table::{column, float_cell, int_cell, open_csv, time_cell};

/// Fill value for epochs without an actigraphy sample
pub const ACTIVITY_COUNT_UNKNOWN: f64 = f64::NAN;

/// Sampling interval of the wrist actigraphy devices
pub const ACTIGRAPHY_INTERVAL_SECONDS: f64 = 30.0;

/// Device clock reference for one subject
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlapRow {
    /// Actigraphy line recorded when the PSG started
    pub line: u64,
    /// Actigraphy clock at that line
    pub linetime: NaiveTime,
    /// PSG clock at the same moment
    pub psg_start: Option<NaiveTime>,
}

/// Per-subject actigraphy/PSG overlap table
#[derive(Debug, Clone, Default)]
pub struct OverlapTable {
    rows: HashMap<i64, OverlapRow>,
}

impl OverlapTable {
    /// Load a table with `mesaid`, `line`, `linetime` and `starttime_psg` columns
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = open_csv(path)?;
        let headers = reader.headers()?.clone();
        let id_col = column(&headers, "mesaid", path)?;
        let line_col = column(&headers, "line", path)?;
        let linetime_col = column(&headers, "linetime", path)?;
        let psg_col = column(&headers, "starttime_psg", path).ok();

        let mut rows = HashMap::new();
        for row in reader.records() {
            let row = row?;
            let parsed = (
                int_cell(&row, id_col),
                int_cell(&row, line_col),
                time_cell(&row, linetime_col),
            );
            match parsed {
                (Some(id), Some(line), Some(linetime)) if line >= 0 => {
                    rows.insert(
                        id,
                        OverlapRow {
                            line: line as u64,
                            linetime,
                            psg_start: psg_col.and_then(|c| time_cell(&row, c)),
                        },
                    );
                }
                _ => log::debug!("{}: skipping unusable overlap row {:?}", path.display(), row),
            }
        }

        log::debug!("Loaded {} overlap rows from {}", rows.len(), path.display());
        Ok(Self { rows })
    }

    pub fn get(&self, subject_id: i64) -> Option<&OverlapRow> {
        self.rows.get(&subject_id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActigraphySample {
    pub line: u64,
    /// `None` for an empty cell
    pub activity: Option<f64>,
}

/// One subject's raw actigraphy export, in file order
#[derive(Debug, Clone, Default)]
pub struct ActigraphySeries {
    pub samples: Vec<ActigraphySample>,
}

impl ActigraphySeries {
    /// Load a table with `line` and `activity` columns
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = open_csv(path)?;
        let headers = reader.headers()?.clone();
        let line_col = column(&headers, "line", path)?;
        let activity_col = column(&headers, "activity", path)?;

        let mut samples = Vec::new();
        for row in reader.records() {
            let row = row?;
            let line = int_cell(&row, line_col).filter(|l| *l >= 0).ok_or_else(|| {
                SleepError::ParseError(format!(
                    "{}: bad line number in row {:?}",
                    path.display(),
                    row
                ))
            })?;
            samples.push(ActigraphySample {
                line: line as u64,
                activity: float_cell(&row, activity_col),
            });
        }
        Ok(Self { samples })
    }

    pub fn position_of_line(&self, line: u64) -> Option<usize> {
        self.samples.iter().position(|s| s.line == line)
    }
}

/// Activity counts on a PSG epoch grid
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedCounts {
    pub counts: Vec<f64>,
    /// Epochs outside the actigraphy series, filled with [`ACTIVITY_COUNT_UNKNOWN`]
    pub padded_epochs: usize,
}

impl SyncedCounts {
    /// Counts that cover every epoch; only these are cached
    pub fn complete(counts: Vec<f64>) -> Self {
        Self {
            counts,
            padded_epochs: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.padded_epochs == 0
    }
}

/// Maps actigraphy samples onto a PSG epoch grid
#[derive(Debug, Clone, Copy)]
pub struct ActigraphySync {
    pub interval: f64,
    /// Epochs allowed to fall outside the actigraphy series
    pub tolerance_epochs: usize,
}

impl Default for ActigraphySync {
    fn default() -> Self {
        Self {
            interval: ACTIGRAPHY_INTERVAL_SECONDS,
            tolerance_epochs: 0,
        }
    }
}

impl ActigraphySync {
    /// One count per epoch of `grid`.
    ///
    /// The overlap row names the actigraphy line at which the PSG started. The
    /// wall-clock difference between that line and the PSG start is rounded to whole
    /// actigraphy intervals. Each epoch takes the sample at the epoch start. Samples
    /// past the grid are dropped and epochs outside the series are filled with
    /// [`ACTIVITY_COUNT_UNKNOWN`]; more filled epochs than `tolerance_epochs` is an
    /// alignment error.
    pub fn synchronize(
        &self,
        record_id: &str,
        series: &ActigraphySeries,
        overlap: &OverlapRow,
        annotation_start: Option<NaiveTime>,
        grid: &EpochGrid,
    ) -> Result<SyncedCounts> {
        let start_index = series.position_of_line(overlap.line).ok_or_else(|| {
            SleepError::Alignment(format!(
                "{}: overlap line {} not present in actigraphy",
                record_id, overlap.line
            ))
        })?;
        let psg_start = overlap.psg_start.or(annotation_start).ok_or_else(|| {
            SleepError::Alignment(format!("{}: no PSG start time to align to", record_id))
        })?;

        let offset = signed_offset(psg_start, overlap.linetime);
        let shift = (offset / self.interval).round() as i64;
        let first = start_index as i64 - shift;
        log::debug!(
            "{}: actigraphy line {} is {:+.0}s from PSG start, epoch 0 -> sample {}",
            record_id,
            overlap.line,
            offset,
            first
        );

        let mut filled = 0usize;
        let counts: Vec<f64> = (0..grid.num_epochs)
            .map(|i| {
                let index = first + (grid.epoch_start(i) / self.interval + 1e-9).floor() as i64;
                match usize::try_from(index).ok().and_then(|j| series.samples.get(j)) {
                    Some(sample) => sample.activity.unwrap_or(ACTIVITY_COUNT_UNKNOWN),
                    None => {
                        filled += 1;
                        ACTIVITY_COUNT_UNKNOWN
                    }
                }
            })
            .collect();

        if filled > self.tolerance_epochs {
            return Err(SleepError::Alignment(format!(
                "{}: actigraphy covers {} of {} epochs (tolerance {})",
                record_id,
                grid.num_epochs - filled,
                grid.num_epochs,
                self.tolerance_epochs
            )));
        }
        if filled > 0 {
            log::debug!("{}: {} epochs without actigraphy", record_id, filled);
        }
        Ok(SyncedCounts {
            counts,
            padded_epochs: filled,
        })
    }
}
