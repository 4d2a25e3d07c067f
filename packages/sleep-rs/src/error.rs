use thiserror::Error;

#[derive(Error, Debug)]
pub enum SleepError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing {source_name} for record {record_id}")]
    MissingSource {
        record_id: String,
        source_name: String,
    },

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse {0}")]
    ParseError(String),

    #[error("Invalid annotation document: {0}")]
    InvalidAnnotation(String),

    #[error("Alignment mismatch: {0}")]
    Alignment(String),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SleepError {
    pub fn missing(record_id: &str, source_name: impl Into<String>) -> Self {
        SleepError::MissingSource {
            record_id: record_id.to_string(),
            source_name: source_name.into(),
        }
    }

    /// Absence errors are soft: the record is skipped only when the source was mandatory.
    pub fn is_absence(&self) -> bool {
        matches!(
            self,
            SleepError::MissingSource { .. } | SleepError::FileNotFound(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SleepError>;
