//! # Step 6: Batch Embedding Jobs
//!
//! Embeds the prepared summary and chunk inputs as two concurrent batch jobs and
//! keeps their prediction output locally for step 7.

use crate::batch::{run_batch_job, BatchJobRequest, BatchService, PollPolicy};
use crate::errors::PipelineError;
use crate::vector::prepare::{EmbeddingInputManifest, INPUT_MANIFEST_FILE};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

pub const EMBEDDINGS_DIR: &str = "embeddings";
pub const OUTPUT_MANIFEST_FILE: &str = "embedding_output_manifest.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct EmbeddingOutputManifest {
    pub summary_output: Option<PathBuf>,
    pub detailed_output: Option<PathBuf>,
}

/// The embedding jobs of one step-6 run.
#[derive(Debug)]
pub struct EmbeddingJobs<'a> {
    pub service: &'a dyn BatchService,
    pub model: &'a str,
    pub policy: PollPolicy,
    pub cancel: CancellationToken,
    pub run_id: String,
}

impl EmbeddingJobs<'_> {
    async fn embed_file(
        &self,
        prefix: &str,
        input: Option<&Path>,
        output: PathBuf,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let Some(input) = input else {
            warn!("No input for '{prefix}'. Skipping.");
            return Ok(None);
        };
        let display_name = format!("{prefix}-{}", self.run_id);
        info!("Starting batch embedding job: {display_name}");
        info!("  Input: {}", input.display());

        let request = BatchJobRequest {
            display_name,
            model: format!("publishers/google/models/{}", self.model),
            input_jsonl: fs::read_to_string(input)?,
            model_parameters: Some(json!({ "outputTokenization": false })),
        };
        let results = run_batch_job(self.service, request, &self.policy, &self.cancel).await?;
        fs::write(&output, results)?;
        info!("  Output: {}", output.display());
        Ok(Some(output))
    }
}

pub fn load_input_manifest(work_dir: &Path) -> Result<EmbeddingInputManifest, PipelineError> {
    let path = work_dir.join(INPUT_MANIFEST_FILE);
    let body = fs::read_to_string(&path).map_err(|e| {
        PipelineError::MissingPrerequisite(format!(
            "embedding input manifest '{}' ({e}); run step 5 first",
            path.display()
        ))
    })?;
    Ok(serde_json::from_str(&body)?)
}

#[instrument(skip_all, fields(work_dir = %work_dir.display()))]
pub async fn run_embed_step(
    work_dir: &Path,
    service: &dyn BatchService,
    model: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<EmbeddingOutputManifest, PipelineError> {
    info!(">>> Starting Step 6: Run Batch Embedding Jobs <<<");
    let input = load_input_manifest(work_dir)?;
    let output_dir = work_dir.join(EMBEDDINGS_DIR);
    fs::create_dir_all(&output_dir)?;

    let jobs = EmbeddingJobs {
        service,
        model,
        policy,
        cancel: cancel.clone(),
        run_id: format!("embed-{}", Utc::now().timestamp()),
    };
    let (summary_output, detailed_output) = tokio::try_join!(
        jobs.embed_file(
            "summary-embeddings",
            input.summary_input.as_deref(),
            output_dir.join("summary.jsonl"),
        ),
        jobs.embed_file(
            "detailed-embeddings",
            input.detailed_input.as_deref(),
            output_dir.join("detailed.jsonl"),
        ),
    )?;
    info!("Both embedding jobs completed successfully.");

    let manifest = EmbeddingOutputManifest {
        summary_output,
        detailed_output,
    };
    let manifest_path = work_dir.join(OUTPUT_MANIFEST_FILE);
    fs::write(&manifest_path, serde_json::to_string_pretty(&manifest)?)?;
    info!("Output manifest saved to {}", manifest_path.display());
    Ok(manifest)
}
