use chrono::{NaiveDateTime, NaiveTime, Timelike};

use crate::error::{Result, SleepError};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Upper bound on epochs per record
pub const MAX_EPOCHS: usize = 1 << 24;

/// Drift between the annotation and waveform clocks worth reporting
const DRIFT_WARN_SECONDS: f64 = 1.0;

/// Fixed-length epoch grid anchored at the annotation's recording start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochGrid {
    pub epoch_length: f64,
    pub num_epochs: usize,
}

impl EpochGrid {
    /// Grid of the complete epochs that fit into `total_duration` seconds
    pub fn covering(total_duration: f64, epoch_length: f64) -> Result<Self> {
        if !(epoch_length.is_finite() && epoch_length > 0.0) {
            return Err(SleepError::InvalidAnnotation(format!(
                "epoch length {} is not a positive number of seconds",
                epoch_length
            )));
        }
        if !total_duration.is_finite() {
            return Err(SleepError::InvalidAnnotation(format!(
                "record duration {} is not finite",
                total_duration
            )));
        }
        // Tolerate durations like 719.9999999 produced by float arithmetic upstream
        let epochs = ((total_duration.max(0.0) + 1e-6) / epoch_length).floor();
        if epochs > MAX_EPOCHS as f64 {
            return Err(SleepError::InvalidAnnotation(format!(
                "{} s at {} s per epoch exceeds {} epochs",
                total_duration, epoch_length, MAX_EPOCHS
            )));
        }
        Ok(Self {
            epoch_length,
            num_epochs: epochs as usize,
        })
    }

    /// Start of an epoch in seconds; computed by multiplication so it never drifts
    pub fn epoch_start(&self, index: usize) -> f64 {
        index as f64 * self.epoch_length
    }

    pub fn epoch_midpoint(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.epoch_length
    }

    pub fn duration(&self) -> f64 {
        self.epoch_start(self.num_epochs)
    }
}

fn seconds_of_day(time: NaiveTime) -> f64 {
    time.num_seconds_from_midnight() as f64 + time.nanosecond() as f64 * 1e-9
}

/// Signed seconds from `from` to `to`, wrapped into `[-12h, 12h)` so recordings
/// crossing midnight compare correctly.
pub fn signed_offset(from: NaiveTime, to: NaiveTime) -> f64 {
    let diff = seconds_of_day(to) - seconds_of_day(from);
    (diff + SECONDS_PER_DAY / 2.0).rem_euclid(SECONDS_PER_DAY) - SECONDS_PER_DAY / 2.0
}

/// Reconciled clocks of one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockAlignment {
    /// Start declared by the annotation document; epoch indexing is relative to it
    pub reference_start: Option<NaiveTime>,
    /// Start reported on the record: the waveform header clock when known
    pub recording_start: Option<NaiveTime>,
    /// Waveform start minus annotation start, in seconds
    pub drift_seconds: Option<f64>,
}

impl ClockAlignment {
    pub fn reconcile(
        record_id: &str,
        annotation_start: Option<NaiveTime>,
        waveform_start: Option<NaiveDateTime>,
    ) -> Self {
        let waveform_time = waveform_start.map(|dt| dt.time());
        let drift_seconds = match (annotation_start, waveform_time) {
            (Some(a), Some(w)) => Some(signed_offset(a, w)),
            _ => None,
        };

        if let Some(drift) = drift_seconds {
            if drift.abs() >= DRIFT_WARN_SECONDS {
                log::debug!(
                    "{}: waveform clock differs from annotation clock by {:.1}s",
                    record_id,
                    drift
                );
            }
        }

        Self {
            reference_start: annotation_start,
            recording_start: waveform_time.or(annotation_start),
            drift_seconds,
        }
    }
}
