//! # Stage 4: Store
//!
//! Upserts every final record of a run into the document store, keyed by id.

use crate::errors::PipelineError;
use crate::providers::db::{DocumentStore, UpsertOutcome};
use crate::run_dir::RunDir;
use crate::types::WriteupRecord;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

fn record_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Reads one record file. `Ok(None)` when the file has no `ctftime_id`.
fn read_record(path: &Path) -> Result<Option<WriteupRecord>, String> {
    let body = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let value: Value = serde_json::from_str(&body).map_err(|e| e.to_string())?;
    if let None | Some(Value::Null) = value.get("ctftime_id") {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| e.to_string())
}

/// Runs stage 4 for `run`.
///
/// A missing or empty `ai_processed/` directory is not an error. Store failures are.
#[instrument(skip_all, fields(run = %run.run_id()))]
pub async fn run_store_stage(
    run: &RunDir,
    store: &dyn DocumentStore,
) -> Result<StoreReport, PipelineError> {
    info!("--- Starting Step 4: Storing documents ---");
    let mut report = StoreReport::default();
    let dir = run.ai_processed_dir();
    if !dir.is_dir() {
        warn!("Directory not found: {}", dir.display());
        return Ok(report);
    }
    let files = record_files(&dir)?;
    if files.is_empty() {
        warn!("No JSON files found in {}", dir.display());
        return Ok(report);
    }

    for path in files {
        let file_name = path.display();
        let record = match read_record(&path) {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("Skipping {file_name} as it has no 'ctftime_id'.");
                report.skipped += 1;
                continue;
            }
            Err(e) => {
                error!("Error decoding JSON from {file_name}: {e}");
                report.skipped += 1;
                continue;
            }
        };

        match store.upsert(&record).await? {
            UpsertOutcome::Inserted => {
                info!("Inserted new document for ctftime_id: {}", record.ctftime_id);
                report.inserted += 1;
            }
            UpsertOutcome::Updated => {
                info!("Updated document for ctftime_id: {}", record.ctftime_id);
                report.updated += 1;
            }
        }
    }

    info!(
        "Storage complete: {} inserted, {} updated, {} skipped.",
        report.inserted, report.updated, report.skipped
    );
    Ok(report)
}
