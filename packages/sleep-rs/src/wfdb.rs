// PhysioNet WFDB records: text header, format 16/212 signal files, MIT annotation files
// Specification: https://physionet.org/physiotools/wag/header-5.htm

use chrono::NaiveTime;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Result, SleepError};
use crate::mmap_utils::mmap_file;

/// Default ADC gain when a header specifies 0
const DEFAULT_GAIN: f64 = 200.0;

// MIT annotation pseudo-codes
const SKIP: u16 = 59;
const NUM: u16 = 60;
const SUB: u16 = 61;
const CHN: u16 = 62;
const AUX: u16 = 63;

/// Annotation codes that mark a QRS complex
const QRS_CODES: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 25, 30, 34, 35, 38, 41];

#[derive(Debug, Clone)]
pub struct WfdbSignalSpec {
    pub file_name: String,
    pub format: u16,
    pub gain: f64,
    pub baseline: i32,
    pub units: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct WfdbHeader {
    pub record_name: String,
    pub directory: PathBuf,
    pub sampling_rate: f64,
    pub num_samples: Option<u64>,
    pub base_time: Option<NaiveTime>,
    pub signals: Vec<WfdbSignalSpec>,
    pub comments: Vec<String>,
}

/// Leading numeric part of a header token such as `250/1000` or `2000(-31)/mV`
fn leading_number(token: &str) -> &str {
    let end = token
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e'))
        .unwrap_or(token.len());
    &token[..end]
}

impl WfdbHeader {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(SleepError::FileNotFound(path.display().to_string()));
        }
        let text = fs::read_to_string(path)?;
        let directory = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::parse(&text, directory)
    }

    pub fn parse(text: &str, directory: PathBuf) -> Result<Self> {
        let mut comments = Vec::new();
        let mut lines = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if let Some(comment) = line.strip_prefix('#') {
                comments.push(comment.trim().to_string());
            } else if !line.is_empty() {
                lines.push(line);
            }
        }

        let record_line = lines
            .first()
            .ok_or_else(|| SleepError::ParseError("WFDB header: missing record line".to_string()))?;
        let tokens: Vec<&str> = record_line.split_whitespace().collect();
        let record_name = tokens[0].split('/').next().unwrap_or(tokens[0]).to_string();
        let num_signals: usize = tokens
            .get(1)
            .and_then(|t| t.parse().ok())
            .ok_or_else(|| SleepError::ParseError(format!("WFDB header: bad record line '{}'", record_line)))?;
        let sampling_rate = tokens
            .get(2)
            .and_then(|t| leading_number(t).parse::<f64>().ok())
            .unwrap_or(250.0);
        if !(sampling_rate.is_finite() && sampling_rate > 0.0) {
            return Err(SleepError::ParseError(format!(
                "WFDB header: bad sampling frequency in '{}'",
                record_line
            )));
        }
        let num_samples = tokens.get(3).and_then(|t| t.parse::<u64>().ok());
        let base_time = tokens.get(4).and_then(|t| {
            NaiveTime::parse_from_str(t, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M:%S"))
                .ok()
        });

        if lines.len() < num_signals + 1 {
            return Err(SleepError::ParseError(format!(
                "WFDB header: expected {} signal lines, found {}",
                num_signals,
                lines.len() - 1
            )));
        }

        let signals = lines[1..=num_signals]
            .iter()
            .map(|line| Self::parse_signal_line(line))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            record_name,
            directory,
            sampling_rate,
            num_samples,
            base_time,
            signals,
            comments,
        })
    }

    fn parse_signal_line(line: &str) -> Result<WfdbSignalSpec> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return Err(SleepError::ParseError(format!("WFDB signal line '{}'", line)));
        }
        let format = leading_number(tokens[1])
            .parse::<u16>()
            .map_err(|_| SleepError::ParseError(format!("WFDB signal format '{}'", tokens[1])))?;

        let mut gain = DEFAULT_GAIN;
        let mut explicit_baseline = None;
        let mut units = "mV".to_string();
        if let Some(spec) = tokens.get(2) {
            gain = leading_number(spec).parse::<f64>().unwrap_or(DEFAULT_GAIN);
            if gain == 0.0 {
                gain = DEFAULT_GAIN;
            }
            if let (Some(open), Some(close)) = (spec.find('('), spec.find(')')) {
                explicit_baseline = spec[open + 1..close].parse::<i32>().ok();
            }
            if let Some((_, u)) = spec.split_once('/') {
                units = u.to_string();
            }
        }
        let adc_zero = tokens.get(4).and_then(|t| t.parse::<i32>().ok()).unwrap_or(0);
        let description = if tokens.len() > 8 {
            tokens[8..].join(" ")
        } else {
            String::new()
        };

        Ok(WfdbSignalSpec {
            file_name: tokens[0].to_string(),
            format,
            gain,
            baseline: explicit_baseline.unwrap_or(adc_zero),
            units,
            description,
        })
    }

    pub fn signal_index(&self, description: &str) -> Option<usize> {
        self.signals
            .iter()
            .position(|s| s.description.eq_ignore_ascii_case(description))
    }

    /// Read one signal in physical units
    pub fn read_signal(&self, description: &str) -> Result<Vec<f64>> {
        let index = self.signal_index(description).ok_or_else(|| {
            SleepError::ParseError(format!(
                "WFDB record {} has no signal '{}'",
                self.record_name, description
            ))
        })?;
        let spec = &self.signals[index];

        // Signals sharing a file are interleaved frame by frame
        let group: Vec<usize> = (0..self.signals.len())
            .filter(|&i| self.signals[i].file_name == spec.file_name)
            .collect();
        let position = group.iter().position(|&i| i == index).unwrap_or(0);
        if group.iter().any(|&i| self.signals[i].format != spec.format) {
            return Err(SleepError::ParseError(format!(
                "WFDB file {} mixes signal formats",
                spec.file_name
            )));
        }

        let data = mmap_file(&self.directory.join(&spec.file_name))?;
        let interleaved = decode_samples(&data, spec.format)?;

        Ok(interleaved
            .iter()
            .skip(position)
            .step_by(group.len())
            .map(|&d| (d - spec.baseline) as f64 / spec.gain)
            .collect())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.num_samples.map(|n| n as f64 / self.sampling_rate)
    }
}

fn decode_samples(data: &[u8], format: u16) -> Result<Vec<i32>> {
    match format {
        16 => Ok(data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as i32)
            .collect()),
        212 => {
            // Two 12-bit two's complement samples packed into three bytes
            let sign_extend = |v: i32| if v & 0x800 != 0 { v - 0x1000 } else { v };
            let mut samples = Vec::with_capacity(data.len() / 3 * 2);
            for b in data.chunks_exact(3) {
                let (b0, b1, b2) = (b[0] as i32, b[1] as i32, b[2] as i32);
                samples.push(sign_extend(b0 | ((b1 & 0x0F) << 8)));
                samples.push(sign_extend(b2 | ((b1 & 0xF0) << 4)));
            }
            Ok(samples)
        }
        other => Err(SleepError::ParseError(format!(
            "unsupported WFDB signal format {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MitAnnotation {
    pub sample: u64,
    pub code: u8,
    pub aux: Option<String>,
}

impl MitAnnotation {
    pub fn is_qrs(&self) -> bool {
        QRS_CODES.contains(&self.code)
    }
}

fn read_word(data: &[u8], pos: usize) -> Option<u16> {
    data.get(pos..pos + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
}

/// Read an MIT-format annotation file (e.g. `.st` stages, `.ecg` beats)
pub fn read_annotations(path: &Path) -> Result<Vec<MitAnnotation>> {
    let data = mmap_file(path)?;
    parse_annotations(&data)
}

pub fn parse_annotations(data: &[u8]) -> Result<Vec<MitAnnotation>> {
    let mut annotations: Vec<MitAnnotation> = Vec::new();
    let mut time: i64 = 0;
    let mut pos = 0;

    while let Some(word) = read_word(data, pos) {
        pos += 2;
        let code = word >> 10;
        let value = (word & 0x3FF) as usize;

        match code {
            0 if value == 0 => break,
            SKIP => {
                let (high, low) = match (read_word(data, pos), read_word(data, pos + 2)) {
                    (Some(h), Some(l)) => (h, l),
                    _ => {
                        return Err(SleepError::ParseError(
                            "MIT annotations: truncated SKIP".to_string(),
                        ))
                    }
                };
                pos += 4;
                time += (((high as u32) << 16) | low as u32) as i32 as i64;
            }
            NUM | SUB | CHN => {}
            AUX => {
                let bytes = data.get(pos..pos + value).ok_or_else(|| {
                    SleepError::ParseError("MIT annotations: truncated AUX string".to_string())
                })?;
                pos += value + (value & 1);
                if let Some(last) = annotations.last_mut() {
                    let text = String::from_utf8_lossy(bytes);
                    last.aux = Some(text.trim_end_matches('\0').to_string());
                }
            }
            _ => {
                time += value as i64;
                annotations.push(MitAnnotation {
                    sample: time.max(0) as u64,
                    code: code as u8,
                    aux: None,
                });
            }
        }
    }

    Ok(annotations)
}

/// Write an MIT-format annotation file
pub fn write_annotations(path: &Path, annotations: &[MitAnnotation]) -> Result<()> {
    let mut out = Vec::new();
    let mut previous = 0u64;
    for annotation in annotations {
        let mut interval = annotation.sample.saturating_sub(previous);
        if interval > 0x3FF {
            out.extend_from_slice(&(SKIP << 10).to_le_bytes());
            let skip = interval as u32;
            out.extend_from_slice(&((skip >> 16) as u16).to_le_bytes());
            out.extend_from_slice(&((skip & 0xFFFF) as u16).to_le_bytes());
            interval = 0;
        }
        let word = ((annotation.code as u16) << 10) | interval as u16;
        out.extend_from_slice(&word.to_le_bytes());
        if let Some(aux) = &annotation.aux {
            let bytes = aux.as_bytes();
            out.extend_from_slice(&((AUX << 10) | bytes.len() as u16).to_le_bytes());
            out.extend_from_slice(bytes);
            if bytes.len() % 2 == 1 {
                out.push(0);
            }
        }
        previous = annotation.sample;
    }
    out.extend_from_slice(&[0, 0]);

    let mut file = fs::File::create(path)?;
    file.write_all(&out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "slp01a 2 250 1800000 23:07:00\n\
        slp01a.dat 212 2000(-31)/mV 12 0 -31 41508 0 ECG\n\
        slp01a.dat 212 100/mmHg 12 0 10 0 0 BP\n\
        # 44 M 89\n";

    #[test]
    fn test_parse_header() {
        let header = WfdbHeader::parse(HEADER, PathBuf::from("/data")).unwrap();
        assert_eq!(header.record_name, "slp01a");
        assert_eq!(header.sampling_rate, 250.0);
        assert_eq!(header.num_samples, Some(1_800_000));
        assert_eq!(header.base_time, NaiveTime::from_hms_opt(23, 7, 0));
        assert_eq!(header.signals.len(), 2);
        assert_eq!(header.signals[0].baseline, -31);
        assert_eq!(header.signals[0].gain, 2000.0);
        assert_eq!(header.signals[1].baseline, 0);
        assert_eq!(header.signal_index("bp"), Some(1));
        assert_eq!(header.comments, vec!["44 M 89".to_string()]);
        assert_eq!(header.duration_seconds(), Some(7200.0));
    }

    #[test]
    fn test_zero_sampling_frequency_rejected() {
        for record_line in ["slp01a 2 0 1800000", "slp01a 2 -250 1800000", "slp01a 2 1e999"] {
            let text = HEADER.replacen("slp01a 2 250 1800000 23:07:00", record_line, 1);
            assert!(matches!(
                WfdbHeader::parse(&text, PathBuf::from("/data")),
                Err(SleepError::ParseError(_))
            ));
        }
    }

    #[test]
    fn test_header_missing_signal_lines() {
        let result = WfdbHeader::parse("rec 3 250\nrec.dat 16 200 16 0 0 0 0 ECG\n", PathBuf::new());
        assert!(matches!(result, Err(SleepError::ParseError(_))));
    }

    #[test]
    fn test_decode_format_212() {
        // samples 0x123 and -1 (0xFFF)
        let bytes = [0x23, 0xF1, 0xFF];
        assert_eq!(decode_samples(&bytes, 212).unwrap(), vec![0x123, -1]);
        assert!(decode_samples(&bytes, 310).is_err());
    }

    #[test]
    fn test_read_interleaved_signal() {
        let dir = tempfile::tempdir().unwrap();
        let header_text = "rec 2 100 3\nrec.dat 16 100 16 0 0 0 0 ECG\nrec.dat 16 10 16 0 0 0 0 Resp\n";
        let samples: [i16; 6] = [100, 1, 200, 2, -100, 3];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        fs::write(dir.path().join("rec.dat"), bytes).unwrap();
        fs::write(dir.path().join("rec.hea"), header_text).unwrap();

        let header = WfdbHeader::open(&dir.path().join("rec.hea")).unwrap();
        assert_eq!(header.read_signal("ECG").unwrap(), vec![1.0, 2.0, -1.0]);
        assert_eq!(header.read_signal("Resp").unwrap(), vec![0.1, 0.2, 0.3]);
        assert!(header.read_signal("EEG").is_err());
    }

    #[test]
    fn test_annotations_with_aux_and_skip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec.st");
        let annotations = vec![
            MitAnnotation { sample: 1, code: 22, aux: Some("W".to_string()) },
            MitAnnotation { sample: 7501, code: 22, aux: Some("2 OA".to_string()) },
            MitAnnotation { sample: 7600, code: 1, aux: None },
        ];
        write_annotations(&path, &annotations).unwrap();

        let parsed = read_annotations(&path).unwrap();
        assert_eq!(parsed, annotations);
        assert!(parsed[2].is_qrs());
        assert!(!parsed[0].is_qrs());
    }
}
