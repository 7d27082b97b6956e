//! # Rejection Ledger
//!
//! A cross-run, append-only list of write-up ids that must never be scraped again.
//! One id per line; anything after `#` is a comment and blank lines are ignored.
//! The file is only ever appended to. Two processes appending at once may
//! interleave lines, so a run directory must not be shared by concurrent runs.

use crate::types::WriteupId;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to read rejection ledger '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to append to rejection ledger '{path}': {source}")]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct RejectionLedger {
    path: PathBuf,
    ids: HashSet<WriteupId>,
}

impl RejectionLedger {
    /// Loads the ledger. A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let ids = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| LedgerError::Read {
                path: path.clone(),
                source,
            })?;
            parse_ledger(&content)
        } else {
            HashSet::new()
        };
        debug!(
            "Loaded {} rejected ids from '{}'.",
            ids.len(),
            path.display()
        );
        Ok(Self { path, ids })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ids(&self) -> &HashSet<WriteupId> {
        &self.ids
    }

    pub fn contains(&self, id: WriteupId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Appends `id` and syncs the file. Returns `false` if it was already present.
    pub fn add(&mut self, id: WriteupId) -> Result<bool, LedgerError> {
        if self.ids.contains(&id) {
            return Ok(false);
        }
        let append_err = |source| LedgerError::Append {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(append_err)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(append_err)?;
        writeln!(file, "{id}").map_err(append_err)?;
        file.sync_data().map_err(append_err)?;

        self.ids.insert(id);
        Ok(true)
    }
}

/// Parses ledger content, skipping comments, blank lines and malformed entries.
pub fn parse_ledger(content: &str) -> HashSet<WriteupId> {
    let mut ids = HashSet::new();
    for (line_no, line) in content.lines().enumerate() {
        let entry = line.split('#').next().unwrap_or_default().trim();
        if entry.is_empty() {
            continue;
        }
        match entry.parse::<WriteupId>() {
            Ok(id) => {
                ids.insert(id);
            }
            Err(_) => warn!(
                "Could not parse id from rejection ledger line {}: '{}'",
                line_no + 1,
                line.trim()
            ),
        }
    }
    ids
}
