//! # Step 7: Populate Indexes
//!
//! Turns raw embedding predictions into index entries and loads both indexes
//! concurrently.

use crate::errors::PipelineError;
use crate::vector::embed::{EmbeddingOutputManifest, OUTPUT_MANIFEST_FILE};
use crate::vector::index::{EmbeddingEntry, VectorIndex};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PopulateReport {
    pub summary: usize,
    pub detailed: usize,
}

/// One prediction line: `instance.id` plus `predictions[0].embeddings.values`.
pub fn parse_embedding_line(line: &str) -> Result<EmbeddingEntry, String> {
    let data: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let instance = data.get("instance").ok_or("missing 'instance'")?;
    let id = instance
        .get("id")
        .and_then(Value::as_str)
        .ok_or("missing 'instance.id'")?;
    let values = data
        .pointer("/predictions/0/embeddings/values")
        .and_then(Value::as_array)
        .ok_or("missing 'predictions[0].embeddings.values'")?;
    let embedding = values
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect::<Option<Vec<f32>>>()
        .ok_or("non-numeric embedding value")?;

    Ok(EmbeddingEntry {
        id: id.to_string(),
        embedding,
        document_id: instance
            .get("document_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        chunk_index: instance
            .get("chunk_index")
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok()),
    })
}

/// Every usable entry of a prediction file. Malformed lines are skipped.
pub fn parse_embedding_output(jsonl: &str) -> Vec<EmbeddingEntry> {
    jsonl
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(line_no, line)| match parse_embedding_line(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping malformed line {}: {e}", line_no + 1);
                None
            }
        })
        .collect()
}

/// Loads one index from one prediction file. Returns how many entries were written.
pub async fn populate_index(
    index: &dyn VectorIndex,
    label: &str,
    index_name: Option<&str>,
    source: Option<&Path>,
    overwrite: bool,
) -> Result<usize, PipelineError> {
    let (Some(index_name), Some(source)) = (index_name, source) else {
        warn!("Missing index name or embeddings for '{label}'. Skipping population.");
        return Ok(0);
    };
    let entries = parse_embedding_output(&fs::read_to_string(source)?);
    if entries.is_empty() {
        error!("No records could be read from {}. Aborting for this index.", source.display());
        return Ok(0);
    }
    if overwrite {
        info!("Populating '{label}' index ({index_name}) with a complete overwrite.");
    } else {
        info!("Appending to '{label}' index ({index_name}).");
    }
    Ok(index
        .update_embeddings(index_name, &entries, overwrite)
        .await?)
}

#[instrument(skip_all, fields(work_dir = %work_dir.display()))]
pub async fn run_populate_step(
    work_dir: &Path,
    index: &dyn VectorIndex,
    summary_index: Option<&str>,
    detailed_index: Option<&str>,
    overwrite: bool,
) -> Result<PopulateReport, PipelineError> {
    info!(">>> Starting Step 7: Populate Vector Indexes <<<");
    let manifest_path = work_dir.join(OUTPUT_MANIFEST_FILE);
    let body = fs::read_to_string(&manifest_path).map_err(|e| {
        PipelineError::MissingPrerequisite(format!(
            "embedding output manifest '{}' ({e}); run step 6 first",
            manifest_path.display()
        ))
    })?;
    let manifest: EmbeddingOutputManifest = serde_json::from_str(&body)?;

    let (summary, detailed) = tokio::try_join!(
        populate_index(
            index,
            "summary",
            summary_index,
            manifest.summary_output.as_deref(),
            overwrite,
        ),
        populate_index(
            index,
            "detailed",
            detailed_index,
            manifest.detailed_output.as_deref(),
            overwrite,
        ),
    )?;
    info!("Populated {summary} summary and {detailed} detailed entries.");
    Ok(PopulateReport { summary, detailed })
}
