use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SleepError};
use crate::types::DatasetKind;

const NSRR_URL: &str = "https://sleepdata.org";
const PHYSIONET_URL: &str = "https://physionet.org/files";
const SLPDB_VERSION: &str = "1.0.0";
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Remote archive access used in online mode
pub trait Downloader: Send + Sync {
    /// File names directly inside `subfolder` of the dataset archive
    fn list(&self, dataset: DatasetKind, subfolder: &str) -> Result<Vec<String>>;

    /// Download `remote_path` (relative to the dataset root) to `target`
    fn fetch(&self, dataset: DatasetKind, remote_path: &str, target: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// NSRR download token, required for MESA and SHHS
    #[serde(skip_serializing)]
    pub nsrr_token: Option<String>,
    pub nsrr_url: String,
    pub physionet_url: String,
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            nsrr_token: None,
            nsrr_url: NSRR_URL.to_string(),
            physionet_url: PHYSIONET_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NsrrFileEntry {
    file_name: String,
    #[serde(default)]
    is_file: bool,
}

/// Blocking HTTP client for the NSRR and PhysioNet archives
pub struct HttpDownloader {
    config: DownloadConfig,
    client: reqwest::blocking::Client,
}

impl HttpDownloader {
    pub fn new(config: DownloadConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("sleep-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SleepError::Download(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn nsrr_token(&self) -> Result<&str> {
        self.config.nsrr_token.as_deref().ok_or_else(|| {
            SleepError::InvalidConfig("NSRR datasets require a download token".to_string())
        })
    }

    fn file_url(&self, dataset: DatasetKind, remote_path: &str) -> Result<String> {
        if dataset.is_nsrr() {
            Ok(format!(
                "{}/datasets/{}/files/a/{}/m/sleep-rs/{}",
                self.config.nsrr_url,
                dataset.slug(),
                self.nsrr_token()?,
                remote_path
            ))
        } else {
            Ok(format!(
                "{}/{}/{}/{}",
                self.config.physionet_url,
                dataset.slug(),
                SLPDB_VERSION,
                remote_path
            ))
        }
    }

    fn get(&self, url: &str, what: &str) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SleepError::Download(format!("{}: {}", what, e)))?;
        if !response.status().is_success() {
            return Err(SleepError::Download(format!(
                "{}: server returned status {}",
                what,
                response.status()
            )));
        }
        Ok(response)
    }
}

impl Downloader for HttpDownloader {
    fn list(&self, dataset: DatasetKind, subfolder: &str) -> Result<Vec<String>> {
        if dataset.is_nsrr() {
            let url = format!(
                "{}/api/v1/datasets/{}/files.json?path={}&auth_token={}",
                self.config.nsrr_url,
                dataset.slug(),
                subfolder,
                self.nsrr_token()?
            );
            let entries: Vec<NsrrFileEntry> = self
                .get(&url, subfolder)?
                .json()
                .map_err(|e| SleepError::Download(format!("Failed to parse file list: {}", e)))?;
            Ok(entries
                .into_iter()
                .filter(|e| e.is_file)
                .map(|e| e.file_name)
                .collect())
        } else {
            // PhysioNet publishes record names rather than a directory listing
            let url = self.file_url(dataset, "RECORDS")?;
            let text = self
                .get(&url, "RECORDS")?
                .text()
                .map_err(|e| SleepError::Download(format!("RECORDS: {}", e)))?;
            Ok(text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect())
        }
    }

    fn fetch(&self, dataset: DatasetKind, remote_path: &str, target: &Path) -> Result<()> {
        let url = self.file_url(dataset, remote_path)?;
        log::info!("Downloading {} {}", dataset.slug(), remote_path);
        let mut response = self.get(&url, remote_path)?;

        let parent = target.parent().ok_or_else(|| {
            SleepError::InvalidConfig(format!("{} has no parent", target.display()))
        })?;
        fs::create_dir_all(parent)?;
        let tmp = target.with_extension(format!("download-{}", uuid::Uuid::new_v4()));

        let copied = fs::File::create(&tmp)
            .map_err(SleepError::from)
            .and_then(|mut file| {
                response
                    .copy_to(&mut file)
                    .map_err(|e| SleepError::Download(format!("{}: {}", remote_path, e)))
            })
            .and_then(|_| fs::rename(&tmp, target).map_err(SleepError::from));
        if copied.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        copied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_urls() {
        let downloader = HttpDownloader::new(DownloadConfig {
            nsrr_token: Some("abc".to_string()),
            ..DownloadConfig::default()
        })
        .unwrap();
        assert_eq!(
            downloader
                .file_url(DatasetKind::Mesa, "polysomnography/edfs/mesa-sleep-0001.edf")
                .unwrap(),
            "https://sleepdata.org/datasets/mesa/files/a/abc/m/sleep-rs/polysomnography/edfs/mesa-sleep-0001.edf"
        );
        assert_eq!(
            downloader.file_url(DatasetKind::Slpdb, "slp01a.hea").unwrap(),
            "https://physionet.org/files/slpdb/1.0.0/slp01a.hea"
        );
    }

    #[test]
    fn test_nsrr_requires_token() {
        let downloader = HttpDownloader::new(DownloadConfig::default()).unwrap();
        assert!(matches!(
            downloader.file_url(DatasetKind::Shhs, "x"),
            Err(SleepError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_token_not_serialized() {
        let config = DownloadConfig {
            nsrr_token: Some("secret".to_string()),
            ..DownloadConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
