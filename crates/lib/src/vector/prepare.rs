//! # Step 5: Prepare Embedding Inputs
//!
//! Reads every stored write-up and writes the two embedding inputs: one line per
//! summary, and one line per chunk of the rewritten text.

use crate::errors::PipelineError;
use crate::providers::db::{DocumentFilter, DocumentStore};
use crate::types::WriteupRecord;
use crate::vector::chunker::Chunker;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

pub const SUMMARIES_FILE: &str = "summaries.jsonl";
pub const DETAILED_FILE: &str = "detailed_chunks.jsonl";
pub const INPUT_MANIFEST_FILE: &str = "embedding_input_manifest.json";

/// One line of an embedding input file. `content` is what gets embedded.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingInstance {
    pub id: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

/// Where step 5 left its inputs. `None` when there was nothing to write.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct EmbeddingInputManifest {
    pub summary_input: Option<PathBuf>,
    pub detailed_input: Option<PathBuf>,
}

pub fn summary_instances(records: &[WriteupRecord]) -> Vec<EmbeddingInstance> {
    records
        .iter()
        .filter(|r| !r.rag_summary.is_empty())
        .map(|r| EmbeddingInstance {
            id: r.ctftime_id.to_string(),
            content: r.rag_summary.clone(),
            document_id: None,
            chunk_index: None,
        })
        .collect()
}

pub fn chunk_instances(records: &[WriteupRecord], chunker: &Chunker) -> Vec<EmbeddingInstance> {
    records
        .iter()
        .filter(|r| !r.rewritten_full_text.is_empty())
        .flat_map(|r| chunker.chunk(&r.ctftime_id.to_string(), &r.rewritten_full_text))
        .map(|chunk| EmbeddingInstance {
            id: chunk.id.to_string(),
            content: chunk.content,
            document_id: Some(chunk.id.document_id),
            chunk_index: Some(chunk.id.chunk_index),
        })
        .collect()
}

/// Writes `instances` as JSONL. Nothing is written for an empty set.
pub fn write_jsonl(path: &Path, instances: &[EmbeddingInstance]) -> Result<Option<PathBuf>, PipelineError> {
    if instances.is_empty() {
        warn!("No data to save for '{}'. Skipping.", path.display());
        return Ok(None);
    }
    let mut writer = BufWriter::new(File::create(path)?);
    for instance in instances {
        serde_json::to_writer(&mut writer, instance)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    info!("Saved {} lines to {}", instances.len(), path.display());
    Ok(Some(path.to_path_buf()))
}

#[instrument(skip_all, fields(work_dir = %work_dir.display()))]
pub async fn run_prepare_step(
    work_dir: &Path,
    store: &dyn DocumentStore,
    chunker: &Chunker,
) -> Result<EmbeddingInputManifest, PipelineError> {
    info!(">>> Starting Step 5: Prepare Data for Embedding <<<");
    fs::create_dir_all(work_dir)?;
    let records = store.find(&DocumentFilter::All).await?;
    info!("Found {} documents in the store.", records.len());

    let summaries = summary_instances(&records);
    info!("Prepared {} summaries.", summaries.len());
    let chunks = chunk_instances(&records, chunker);
    info!("Prepared {} detailed chunks.", chunks.len());

    let manifest = EmbeddingInputManifest {
        summary_input: write_jsonl(&work_dir.join(SUMMARIES_FILE), &summaries)?,
        detailed_input: write_jsonl(&work_dir.join(DETAILED_FILE), &chunks)?,
    };
    let manifest_path = work_dir.join(INPUT_MANIFEST_FILE);
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    info!("Input manifest saved to {}", manifest_path.display());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::chunker::CharTokenizer;

    fn record(id: u64, summary: &str, rewritten: &str) -> WriteupRecord {
        WriteupRecord {
            ctftime_id: id,
            rag_summary: summary.into(),
            rewritten_full_text: rewritten.into(),
            ..WriteupRecord::default()
        }
    }

    #[test]
    fn empty_fields_are_skipped() {
        let records = vec![record(1, "s", ""), record(2, "", "abcdef")];
        let chunker = Chunker::new(Box::new(CharTokenizer), 4, 1).unwrap();

        let summaries = summary_instances(&records);
        let chunks = chunk_instances(&records, &chunker);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "1");
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2_chunk_0", "2_chunk_1"]);
        assert_eq!(chunks[1].document_id.as_deref(), Some("2"));
        assert_eq!(chunks[1].chunk_index, Some(1));
    }

    #[test]
    fn summary_lines_carry_only_id_and_content() {
        let line = serde_json::to_value(&summary_instances(&[record(5, "sum", "")])[0]).unwrap();
        assert_eq!(line, serde_json::json!({"id": "5", "content": "sum"}));
    }
}
