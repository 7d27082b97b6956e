//! # Run Manifest
//!
//! The persisted state of one intake run. Each canonical source URL maps to its
//! tasks and a status that only moves forward:
//!
//! ```text
//! scraped ──> cleaned
//!         ├─> rejected_low_quality
//!         └─> failed_cleaning
//! failed_scrape            (stage 1 only, kept in `failed_urls`)
//! ```
//!
//! The status is a tagged enum whose variants carry their own payload, so a
//! `cleaned` entry without any cleaned text path cannot be represented once the
//! manifest has been validated.

use crate::types::TaskInfo;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

pub const MANIFEST_FILE_NAME: &str = "run_manifest.json";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Could not read manifest '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not write manifest '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Could not parse manifest '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid manifest entry for '{url}': {reason}")]
    Invalid { url: String, reason: String },
    #[error("Unknown URL in manifest: {0}")]
    UnknownUrl(String),
    #[error("Illegal transition for '{url}': {from} -> {to}")]
    IllegalTransition {
        url: String,
        from: UrlStatus,
        to: UrlStatus,
    },
}

/// The status of one source URL together with the data that status owns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UrlState {
    Scraped,
    Cleaned {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleaned_text_path: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleaned_summary_path: Option<String>,
    },
    RejectedLowQuality,
    FailedCleaning,
    FailedScrape,
}

/// The payload-free discriminant of [`UrlState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlStatus {
    Scraped,
    Cleaned,
    RejectedLowQuality,
    FailedCleaning,
    FailedScrape,
}

impl UrlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlStatus::Scraped => "scraped",
            UrlStatus::Cleaned => "cleaned",
            UrlStatus::RejectedLowQuality => "rejected_low_quality",
            UrlStatus::FailedCleaning => "failed_cleaning",
            UrlStatus::FailedScrape => "failed_scrape",
        }
    }

    /// Whether `self -> next` is an allowed forward step.
    pub fn can_advance_to(&self, next: UrlStatus) -> bool {
        matches!(
            (self, next),
            (
                UrlStatus::Scraped,
                UrlStatus::Cleaned | UrlStatus::RejectedLowQuality | UrlStatus::FailedCleaning
            )
        )
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl UrlState {
    pub fn status(&self) -> UrlStatus {
        match self {
            UrlState::Scraped => UrlStatus::Scraped,
            UrlState::Cleaned { .. } => UrlStatus::Cleaned,
            UrlState::RejectedLowQuality => UrlStatus::RejectedLowQuality,
            UrlState::FailedCleaning => UrlStatus::FailedCleaning,
            UrlState::FailedScrape => UrlStatus::FailedScrape,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    #[serde(flatten)]
    pub state: UrlState,
    pub tasks: Vec<TaskInfo>,
}

impl UrlEntry {
    pub fn status(&self) -> UrlStatus {
        self.state.status()
    }

    /// The task stages act on. Groups are single-task by construction.
    pub fn primary_task(&self) -> Option<&TaskInfo> {
        self.tasks.first()
    }

    fn validate(&self, url: &str, failed_map: bool) -> Result<(), ManifestError> {
        let invalid = |reason: &str| ManifestError::Invalid {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        if self.tasks.is_empty() {
            return Err(invalid("entry has no tasks"));
        }
        match (&self.state, failed_map) {
            (UrlState::FailedScrape, false) => {
                Err(invalid("failed_scrape entries belong in failed_urls"))
            }
            (UrlState::FailedScrape, true) => Ok(()),
            (_, true) => Err(invalid("failed_urls may only hold failed_scrape entries")),
            (
                UrlState::Cleaned {
                    cleaned_text_path: None,
                    cleaned_summary_path: None,
                },
                false,
            ) => Err(invalid("cleaned entry has no cleaned text path")),
            _ => Ok(()),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct RunManifest {
    pub run_id: String,
    pub start_time: String,
    #[serde(default)]
    pub processed_urls: BTreeMap<String, UrlEntry>,
    #[serde(default)]
    pub failed_urls: BTreeMap<String, UrlEntry>,
}

impl RunManifest {
    pub fn new(run_id: impl Into<String>, start_time: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            start_time: start_time.into(),
            ..Default::default()
        }
    }

    /// Records the outcome of stage 1 for a URL.
    pub fn record_scrape(&mut self, url: impl Into<String>, tasks: Vec<TaskInfo>, ok: bool) {
        let url = url.into();
        if ok {
            self.processed_urls.insert(
                url,
                UrlEntry {
                    state: UrlState::Scraped,
                    tasks,
                },
            );
        } else {
            self.failed_urls.insert(
                url,
                UrlEntry {
                    state: UrlState::FailedScrape,
                    tasks,
                },
            );
        }
    }

    /// URLs whose status is exactly `status`, in key order.
    pub fn urls_with_status(&self, status: UrlStatus) -> Vec<(&String, &UrlEntry)> {
        self.processed_urls
            .iter()
            .chain(self.failed_urls.iter())
            .filter(|(_, entry)| entry.status() == status)
            .collect()
    }

    pub fn count(&self, status: UrlStatus) -> usize {
        self.urls_with_status(status).len()
    }

    /// Moves a processed URL forward. Regressions and steps out of terminal states fail.
    pub fn advance(&mut self, url: &str, next: UrlState) -> Result<(), ManifestError> {
        let entry = self
            .processed_urls
            .get_mut(url)
            .ok_or_else(|| ManifestError::UnknownUrl(url.to_string()))?;
        let from = entry.status();
        let to = next.status();
        if !from.can_advance_to(to) {
            return Err(ManifestError::IllegalTransition {
                url: url.to_string(),
                from,
                to,
            });
        }
        if let UrlState::Cleaned {
            cleaned_text_path: None,
            cleaned_summary_path: None,
        } = next
        {
            return Err(ManifestError::Invalid {
                url: url.to_string(),
                reason: "cleaned entry has no cleaned text path".to_string(),
            });
        }
        entry.state = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        for (url, entry) in &self.processed_urls {
            entry.validate(url, false)?;
        }
        for (url, entry) in &self.failed_urls {
            entry.validate(url, true)?;
        }
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest: RunManifest =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| {
                ManifestError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        self.validate()?;
        let write_err = |source| ManifestError::Write {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
            ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.flush().map_err(write_err)?;
        info!("Saved run manifest to '{}'.", path.display());
        Ok(())
    }
}
