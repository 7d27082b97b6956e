//! # Stage 2: Extract
//!
//! Turns the raw HTML of every `scraped` URL into cleaned text and applies the
//! minimum-length quality gate to each of its (at most two) sources.

use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::ledger::RejectionLedger;
use crate::manifest::{RunManifest, UrlState, UrlStatus};
use crate::run_dir::{RunDir, CLEANED_DIR};
use crate::types::WriteupId;
use std::fmt::Debug;
use std::fs;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

#[derive(Error, Debug)]
#[error("{0}")]
pub struct ExtractError(pub String);

/// Converts raw markup into readable text.
pub trait ContentExtractor: Send + Sync + Debug {
    fn extract(&self, html: &str) -> Result<String, ExtractError>;
}

/// The result of cleaning one source of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// No raw file, or it could not be read or extracted.
    Absent,
    /// Extracted text shorter than the threshold. Nothing is written.
    LowQuality,
    /// Cleaned text written to this run-relative path.
    Passed(String),
}

impl SourceOutcome {
    fn passed_path(&self) -> Option<String> {
        match self {
            SourceOutcome::Passed(path) => Some(path.clone()),
            _ => None,
        }
    }

    fn is_low_quality(&self) -> bool {
        *self == SourceOutcome::LowQuality
    }
}

/// Maps the outcomes of the primary and summary sources to the next URL state.
///
/// Any passing source wins. Otherwise a low-quality source rejects the item;
/// when both are absent, cleaning failed.
pub fn decide(primary: &SourceOutcome, summary: &SourceOutcome) -> UrlState {
    let cleaned_text_path = primary.passed_path();
    let cleaned_summary_path = summary.passed_path();
    if cleaned_text_path.is_some() || cleaned_summary_path.is_some() {
        return UrlState::Cleaned {
            cleaned_text_path,
            cleaned_summary_path,
        };
    }
    if primary.is_low_quality() || summary.is_low_quality() {
        UrlState::RejectedLowQuality
    } else {
        UrlState::FailedCleaning
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub cleaned: usize,
    pub rejected: usize,
    pub failed: usize,
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn process_source(
    run: &RunDir,
    extractor: &dyn ContentExtractor,
    min_length: usize,
    id: WriteupId,
    input: &Path,
) -> SourceOutcome {
    if !input.exists() {
        return SourceOutcome::Absent;
    }
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    debug!("Processing: {file_name}");

    let html = match fs::read_to_string(input) {
        Ok(html) => html,
        Err(e) => {
            error!("Error reading file {file_name}: {e}");
            return SourceOutcome::Absent;
        }
    };
    let text = match extractor.extract(&html) {
        Ok(text) => text,
        Err(e) => {
            error!("Error processing file {file_name}: {e}");
            return SourceOutcome::Absent;
        }
    };

    if char_count(&text) < min_length {
        debug!("Content for {id} in {file_name} is too short or empty.");
        return SourceOutcome::LowQuality;
    }

    let out_name = file_name.replace(".html", ".txt");
    let out_path = run.cleaned_dir().join(&out_name);
    if let Err(e) = fs::write(&out_path, text) {
        error!("Could not write cleaned text {}: {e}", out_path.display());
        return SourceOutcome::Absent;
    }
    SourceOutcome::Passed(format!("{CLEANED_DIR}/{out_name}"))
}

/// Runs stage 2 against the run's manifest and saves it back.
#[instrument(skip_all, fields(run = %run.run_id()))]
pub async fn run_extraction_stage(
    run: &RunDir,
    config: &PipelineConfig,
    extractor: &dyn ContentExtractor,
) -> Result<ExtractReport, PipelineError> {
    let manifest_path = run.manifest_path();
    let mut manifest = RunManifest::load(&manifest_path)?;
    let mut report = ExtractReport::default();

    let pending: Vec<(String, WriteupId)> = manifest
        .urls_with_status(UrlStatus::Scraped)
        .into_iter()
        .filter_map(|(url, entry)| {
            entry
                .primary_task()
                .map(|task| (url.clone(), task.ctftime_id))
        })
        .collect();
    if pending.is_empty() {
        info!("No new URLs to process in the manifest.");
        return Ok(report);
    }

    info!("--- Starting Step 2: Main Content Extraction ---");
    info!("Loaded manifest with {} URLs to process.", pending.len());
    fs::create_dir_all(run.cleaned_dir())?;
    let mut ledger = RejectionLedger::load(&config.paths.rejected_ids_log)?;
    let min_length = config.extraction.min_content_length;
    let started = Instant::now();

    for (url, id) in pending {
        let primary = process_source(run, extractor, min_length, id, &run.primary_html(id));
        let summary = process_source(run, extractor, min_length, id, &run.summary_html(id));

        let next = decide(&primary, &summary);
        match &next {
            UrlState::RejectedLowQuality => {
                info!("Rejecting {id}: all available content was low quality.");
                if let Err(e) = ledger.add(id) {
                    error!("Failed to record rejected id {id}: {e}");
                }
                report.rejected += 1;
            }
            UrlState::Cleaned { .. } => {
                info!("Successfully processed content for ID {id}.");
                report.cleaned += 1;
            }
            _ => {
                warn!("Failed to clean any content for ID {id}.");
                report.failed += 1;
            }
        }
        manifest.advance(&url, next)?;
    }

    manifest.save(&manifest_path)?;
    info!(
        "Processing complete in {:.2} seconds.",
        started.elapsed().as_secs_f64()
    );
    info!("  Successfully converted: {} files.", report.cleaned);
    info!("  Skipped (low quality): {} files.", report.rejected);
    Ok(report)
}
