// EDF (European Data Format) reader, plus a minimal writer used to build fixtures
// Specification: https://www.edfplus.info/specs/edf.html

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, SleepError};

/// Byte offset of the "number of data records" field in the main header
const NUM_RECORDS_OFFSET: u64 = 236;

#[derive(Debug, Clone)]
pub struct EdfHeader {
    pub version: String,              // 8 bytes: version of this data format (0)
    pub patient_id: String,           // 80 bytes: local patient identification
    pub recording_id: String,         // 80 bytes: local recording identification
    pub start_date: String,           // 8 bytes: startdate of recording (dd.mm.yy)
    pub start_time: String,           // 8 bytes: starttime of recording (hh.mm.ss)
    pub header_bytes: usize,          // 8 bytes: number of bytes in header record
    pub reserved: String,             // 44 bytes: reserved
    pub num_data_records: i64,        // 8 bytes: number of data records (-1 if unknown)
    pub duration_of_data_record: f64, // 8 bytes: duration of a data record, in seconds
    pub num_signals: usize,           // 4 bytes: number of signals (channels)
}

impl EdfHeader {
    /// Wall-clock time of the first sample.
    ///
    /// Two-digit years follow the EDF clipping rule: 85-99 are 19xx, 00-84 are 20xx.
    pub fn start_datetime(&self) -> Option<NaiveDateTime> {
        let date_parts: Vec<u32> = self
            .start_date
            .split('.')
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        let time_parts: Vec<u32> = self
            .start_time
            .split(['.', ':'])
            .map(|p| p.trim().parse::<u32>())
            .collect::<std::result::Result<_, _>>()
            .ok()?;
        if date_parts.len() != 3 || time_parts.len() != 3 {
            return None;
        }

        let yy = date_parts[2] as i32;
        let year = if yy > 84 { 1900 + yy } else { 2000 + yy };
        let date = NaiveDate::from_ymd_opt(year, date_parts[1], date_parts[0])?;
        let time = NaiveTime::from_hms_opt(time_parts[0], time_parts[1], time_parts[2])?;
        Some(NaiveDateTime::new(date, time))
    }
}

#[derive(Debug, Clone)]
pub struct EdfSignalHeader {
    pub label: String,                 // 16 bytes: label (e.g. EEG Fpz-Cz)
    pub transducer_type: String,       // 80 bytes: transducer type (e.g. AgAgCl electrode)
    pub physical_dimension: String,    // 8 bytes: physical dimension (e.g. uV)
    pub physical_minimum: f64,         // 8 bytes: physical minimum
    pub physical_maximum: f64,         // 8 bytes: physical maximum
    pub digital_minimum: i64,          // 8 bytes: digital minimum
    pub digital_maximum: i64,          // 8 bytes: digital maximum
    pub prefiltering: String,          // 80 bytes: prefiltering
    pub num_samples_per_record: usize, // 8 bytes: number of samples in each data record
    pub reserved: String,              // 32 bytes: reserved
}

impl EdfSignalHeader {
    /// Header for a 16-bit signal spanning `[physical_minimum, physical_maximum]`
    pub fn new(
        label: &str,
        dimension: &str,
        physical_minimum: f64,
        physical_maximum: f64,
        num_samples_per_record: usize,
    ) -> Self {
        Self {
            label: label.to_string(),
            transducer_type: String::new(),
            physical_dimension: dimension.to_string(),
            physical_minimum,
            physical_maximum,
            digital_minimum: i16::MIN as i64,
            digital_maximum: i16::MAX as i64,
            prefiltering: String::new(),
            num_samples_per_record,
            reserved: String::new(),
        }
    }

    pub fn sample_frequency(&self, record_duration: f64) -> f64 {
        self.num_samples_per_record as f64 / record_duration
    }

    pub fn gain(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum)
            / (self.digital_maximum - self.digital_minimum) as f64
    }

    pub fn offset(&self) -> f64 {
        self.physical_maximum - self.gain() * self.digital_maximum as f64
    }
}

pub struct EdfReader {
    file: BufReader<File>,
    pub header: EdfHeader,
    pub signal_headers: Vec<EdfSignalHeader>,
    data_start_offset: u64,
    record_size: usize,
}

fn parse_field<T: std::str::FromStr>(value: &str, field: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| SleepError::ParseError(format!("EDF {} '{}': {}", field, value, e)))
}

impl EdfReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SleepError::FileNotFound(path.display().to_string()));
        }
        let mut file = BufReader::new(File::open(path)?);

        let header = Self::read_header(&mut file)?;
        let signal_headers = Self::read_signal_headers(&mut file, header.num_signals)?;

        // Each sample is 2 bytes / 16 bits
        let record_size = signal_headers
            .iter()
            .map(|sh| sh.num_samples_per_record * 2)
            .sum();

        let mut reader = Self {
            file,
            data_start_offset: header.header_bytes as u64,
            header,
            signal_headers,
            record_size,
        };

        // Recover the record count from the file size when the writer never finalized it
        if reader.header.num_data_records < 0 && reader.record_size > 0 {
            let file_len = reader.file.get_ref().metadata()?.len();
            let data_len = file_len.saturating_sub(reader.data_start_offset);
            reader.header.num_data_records = (data_len / reader.record_size as u64) as i64;
        }

        Ok(reader)
    }

    fn read_fixed_string<R: Read>(reader: &mut R, size: usize) -> Result<String> {
        let mut buffer = vec![0u8; size];
        reader.read_exact(&mut buffer).map_err(|e| {
            SleepError::ParseError(format!("EDF header: truncated field ({})", e))
        })?;
        Ok(String::from_utf8_lossy(&buffer).trim().to_string())
    }

    fn read_header<R: Read>(reader: &mut R) -> Result<EdfHeader> {
        let version = Self::read_fixed_string(reader, 8)?;
        let patient_id = Self::read_fixed_string(reader, 80)?;
        let recording_id = Self::read_fixed_string(reader, 80)?;
        let start_date = Self::read_fixed_string(reader, 8)?;
        let start_time = Self::read_fixed_string(reader, 8)?;
        let header_bytes: usize = parse_field(&Self::read_fixed_string(reader, 8)?, "header bytes")?;
        let reserved = Self::read_fixed_string(reader, 44)?;
        let num_data_records: i64 =
            parse_field(&Self::read_fixed_string(reader, 8)?, "number of data records")?;
        let duration_of_data_record: f64 =
            parse_field(&Self::read_fixed_string(reader, 8)?, "record duration")?;
        let num_signals: usize = parse_field(&Self::read_fixed_string(reader, 4)?, "number of signals")?;

        log::debug!(
            "EDF header parsed: num_data_records={}, duration_of_data_record={}, num_signals={}",
            num_data_records,
            duration_of_data_record,
            num_signals
        );

        Ok(EdfHeader {
            version,
            patient_id,
            recording_id,
            start_date,
            start_time,
            header_bytes,
            reserved,
            num_data_records,
            duration_of_data_record,
            num_signals,
        })
    }

    fn read_column<R: Read>(reader: &mut R, num_signals: usize, size: usize) -> Result<Vec<String>> {
        (0..num_signals)
            .map(|_| Self::read_fixed_string(reader, size))
            .collect()
    }

    fn read_signal_headers<R: Read>(reader: &mut R, num_signals: usize) -> Result<Vec<EdfSignalHeader>> {
        // Fields are stored column-wise: all labels, then all transducer types, ...
        let labels = Self::read_column(reader, num_signals, 16)?;
        let transducer_types = Self::read_column(reader, num_signals, 80)?;
        let physical_dimensions = Self::read_column(reader, num_signals, 8)?;
        let physical_minimums = Self::read_column(reader, num_signals, 8)?;
        let physical_maximums = Self::read_column(reader, num_signals, 8)?;
        let digital_minimums = Self::read_column(reader, num_signals, 8)?;
        let digital_maximums = Self::read_column(reader, num_signals, 8)?;
        let prefilterings = Self::read_column(reader, num_signals, 80)?;
        let num_samples = Self::read_column(reader, num_signals, 8)?;
        let reserveds = Self::read_column(reader, num_signals, 32)?;

        (0..num_signals)
            .map(|i| {
                Ok(EdfSignalHeader {
                    label: labels[i].clone(),
                    transducer_type: transducer_types[i].clone(),
                    physical_dimension: physical_dimensions[i].clone(),
                    physical_minimum: parse_field(&physical_minimums[i], "physical minimum")?,
                    physical_maximum: parse_field(&physical_maximums[i], "physical maximum")?,
                    digital_minimum: parse_field(&digital_minimums[i], "digital minimum")?,
                    digital_maximum: parse_field(&digital_maximums[i], "digital maximum")?,
                    prefiltering: prefilterings[i].clone(),
                    num_samples_per_record: parse_field(&num_samples[i], "samples per record")?,
                    reserved: reserveds[i].clone(),
                })
            })
            .collect()
    }

    pub fn signal_index(&self, label: &str) -> Option<usize> {
        self.signal_headers
            .iter()
            .position(|sh| sh.label.eq_ignore_ascii_case(label.trim()))
    }

    pub fn sampling_rate(&self, signal_index: usize) -> f64 {
        self.signal_headers[signal_index].sample_frequency(self.header.duration_of_data_record)
    }

    pub fn total_duration(&self) -> f64 {
        self.header.num_data_records as f64 * self.header.duration_of_data_record
    }

    /// Read every data record of one signal, converted to physical units
    pub fn read_signal(&mut self, signal_index: usize) -> Result<Vec<f64>> {
        if signal_index >= self.signal_headers.len() {
            return Err(SleepError::ParseError(format!(
                "EDF signal index {} out of bounds",
                signal_index
            )));
        }

        let samples_per_record = self.signal_headers[signal_index].num_samples_per_record;
        let offset_in_record: usize = self.signal_headers[..signal_index]
            .iter()
            .map(|sh| sh.num_samples_per_record * 2)
            .sum();
        let num_records = self.header.num_data_records.max(0) as usize;

        let mut digital = Vec::with_capacity(num_records * samples_per_record);
        let mut buf = vec![0u8; samples_per_record * 2];
        for record_idx in 0..num_records {
            let record_offset = self.data_start_offset
                + (record_idx * self.record_size + offset_in_record) as u64;
            self.file.seek(SeekFrom::Start(record_offset))?;
            self.file.read_exact(&mut buf).map_err(|e| {
                SleepError::ParseError(format!("EDF data record {}: {}", record_idx, e))
            })?;
            digital.extend(
                buf.chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
        }

        let signal_header = &self.signal_headers[signal_index];
        let gain = signal_header.gain();
        let offset = signal_header.offset();

        Ok(digital
            .par_iter()
            .map(|&d| gain * d as f64 + offset)
            .collect())
    }

    /// Read a signal by label, returning samples and sampling rate
    pub fn read_signal_by_label(&mut self, label: &str) -> Result<(Vec<f64>, f64)> {
        let index = self.signal_index(label).ok_or_else(|| {
            SleepError::ParseError(format!("EDF file has no channel labelled '{}'", label))
        })?;
        let samples = self.read_signal(index)?;
        Ok((samples, self.sampling_rate(index)))
    }
}

pub struct EdfWriter {
    file: BufWriter<File>,
    header: EdfHeader,
    signal_headers: Vec<EdfSignalHeader>,
    records_written: i64,
}

impl EdfWriter {
    pub fn create<P: AsRef<Path>>(
        path: P,
        start: NaiveDateTime,
        duration_of_data_record: f64,
        signal_headers: Vec<EdfSignalHeader>,
    ) -> Result<Self> {
        let num_signals = signal_headers.len();
        let header = EdfHeader {
            version: "0".to_string(),
            patient_id: "X X X X".to_string(),
            recording_id: "Startdate X X X X".to_string(),
            start_date: start.format("%d.%m.%y").to_string(),
            start_time: start.format("%H.%M.%S").to_string(),
            header_bytes: 256 + num_signals * 256,
            reserved: String::new(),
            num_data_records: -1, // Updated by finalize
            duration_of_data_record,
            num_signals,
        };

        let mut writer = Self {
            file: BufWriter::new(File::create(path)?),
            header,
            signal_headers,
            records_written: 0,
        };
        writer.write_header()?;
        Ok(writer)
    }

    fn write_fixed_string(&mut self, s: &str, size: usize) -> Result<()> {
        let mut buffer = vec![b' '; size];
        let bytes = s.as_bytes();
        let copy_len = bytes.len().min(size);
        buffer[..copy_len].copy_from_slice(&bytes[..copy_len]);
        self.file.write_all(&buffer)?;
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        let fields = [
            (self.header.version.clone(), 8),
            (self.header.patient_id.clone(), 80),
            (self.header.recording_id.clone(), 80),
            (self.header.start_date.clone(), 8),
            (self.header.start_time.clone(), 8),
            (self.header.header_bytes.to_string(), 8),
            (self.header.reserved.clone(), 44),
            (self.header.num_data_records.to_string(), 8),
            (format!("{}", self.header.duration_of_data_record), 8),
            (self.header.num_signals.to_string(), 4),
        ];
        for (value, size) in &fields {
            self.write_fixed_string(value, *size)?;
        }

        let signal_headers = self.signal_headers.clone();
        let columns: [(fn(&EdfSignalHeader) -> String, usize); 10] = [
            (|sh| sh.label.clone(), 16),
            (|sh| sh.transducer_type.clone(), 80),
            (|sh| sh.physical_dimension.clone(), 8),
            (|sh| sh.physical_minimum.to_string(), 8),
            (|sh| sh.physical_maximum.to_string(), 8),
            (|sh| sh.digital_minimum.to_string(), 8),
            (|sh| sh.digital_maximum.to_string(), 8),
            (|sh| sh.prefiltering.clone(), 80),
            (|sh| sh.num_samples_per_record.to_string(), 8),
            (|sh| sh.reserved.clone(), 32),
        ];
        for (field, size) in &columns {
            for sh in &signal_headers {
                self.write_fixed_string(&field(sh), *size)?;
            }
        }

        Ok(())
    }

    pub fn write_physical_record(&mut self, physical_data: &[Vec<f64>]) -> Result<()> {
        if physical_data.len() != self.signal_headers.len() {
            return Err(SleepError::InvalidConfig(format!(
                "Expected {} signals, got {}",
                self.signal_headers.len(),
                physical_data.len()
            )));
        }

        for (signal_header, physical_samples) in self.signal_headers.iter().zip(physical_data) {
            if physical_samples.len() != signal_header.num_samples_per_record {
                return Err(SleepError::InvalidConfig(format!(
                    "Signal {} expected {} samples, got {}",
                    signal_header.label,
                    signal_header.num_samples_per_record,
                    physical_samples.len()
                )));
            }

            let gain = signal_header.gain();
            let offset = signal_header.offset();
            for &physical in physical_samples {
                let digital = ((physical - offset) / gain)
                    .round()
                    .clamp(signal_header.digital_minimum as f64, signal_header.digital_maximum as f64)
                    as i16;
                self.file.write_all(&digital.to_le_bytes())?;
            }
        }

        self.records_written += 1;
        Ok(())
    }

    pub fn finalize(mut self) -> Result<()> {
        self.file.flush()?;
        let count = self.records_written.to_string();
        self.file.seek(SeekFrom::Start(NUM_RECORDS_OFFSET))?;
        self.write_fixed_string(&count, 8)?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_header_calculations() {
        let header = EdfSignalHeader::new("Test", "uV", -100.0, 100.0, 256);

        let sample_freq = header.sample_frequency(1.0);
        assert_eq!(sample_freq, 256.0);

        let gain = header.gain();
        assert!((gain - 0.00305).abs() < 0.001);
    }

    #[test]
    fn test_write_then_read_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("night.edf");
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(20, 29, 59)
            .unwrap();

        let headers = vec![
            EdfSignalHeader::new("EKG", "mV", -5.0, 5.0, 4),
            EdfSignalHeader::new("Pleth", "", -1.0, 1.0, 2),
        ];
        let mut writer = EdfWriter::create(&path, start, 1.0, headers).unwrap();
        for second in 0..3 {
            let ekg = vec![second as f64; 4];
            writer.write_physical_record(&[ekg, vec![0.5, -0.5]]).unwrap();
        }
        writer.finalize().unwrap();

        let mut reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.header.num_data_records, 3);
        assert_eq!(reader.header.start_datetime(), Some(start));
        assert_eq!(reader.total_duration(), 3.0);

        let (samples, fs) = reader.read_signal_by_label("ekg").unwrap();
        assert_eq!(fs, 4.0);
        assert_eq!(samples.len(), 12);
        assert!((samples[8] - 2.0).abs() < 1e-3);

        let pleth = reader.read_signal(1).unwrap();
        assert!((pleth[1] + 0.5).abs() < 1e-3);
        assert!(reader.read_signal_by_label("ECG").is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            EdfReader::open("/nonexistent/night.edf"),
            Err(SleepError::FileNotFound(_))
        ));
    }
}
