//! # Stage 3: AI Transformation
//!
//! Rewrites every cleaned write-up, then summarises it and extracts keywords from
//! the rewrite in parallel, and finally assembles one record per item.

use crate::batch::{BatchService, PollPolicy};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::intake::transform::{BatchTransformStage, TransformItem};
use crate::manifest::{RunManifest, UrlState, UrlStatus};
use crate::prompts::{KEYWORD_PROMPT, REWRITE_PROMPT, SUMMARIZE_PROMPT};
use crate::run_dir::{RunDir, AI_JOB_NAMES};
use crate::types::{TaskInfo, WriteupId, WriteupRecord, UNKNOWN_EVENT, UNKNOWN_TASK};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub const SUMMARY_HEADER: &str = "--- CTFTIME SUMMARY ---";
pub const WRITEUP_HEADER: &str = "--- ORIGINAL WRITEUP ---";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransformReport {
    pub requested: usize,
    pub rewritten: usize,
    pub summarized: usize,
    pub keyworded: usize,
    pub saved: usize,
}

/// Parses the keyword job's answer into a tag list. Anything unparsable is `[]`.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    let cleaned = raw.trim().replace("```json", "").replace("```", "");
    serde_json::from_str::<Vec<String>>(cleaned.trim()).unwrap_or_default()
}

/// Joins the cleaned summary and write-up texts under labelled headers, summary first.
pub fn combine_sources(summary: Option<&str>, primary: Option<&str>) -> Option<String> {
    let parts: Vec<String> = [(SUMMARY_HEADER, summary), (WRITEUP_HEADER, primary)]
        .into_iter()
        .filter_map(|(header, text)| text.map(|t| format!("{header}\n{t}")))
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

/// Merges the per-job results into records. Every id seen by any job gets a record.
pub fn assemble_records<F>(
    rewrites: &HashMap<WriteupId, String>,
    summaries: &HashMap<WriteupId, String>,
    keywords: &HashMap<WriteupId, Vec<String>>,
    full_texts: &HashMap<WriteupId, String>,
    metadata: F,
) -> Vec<WriteupRecord>
where
    F: Fn(WriteupId) -> TaskInfo,
{
    let ids: BTreeSet<WriteupId> = rewrites
        .keys()
        .chain(summaries.keys())
        .chain(keywords.keys())
        .copied()
        .collect();

    ids.into_iter()
        .map(|id| {
            let meta = metadata(id);
            WriteupRecord {
                ctftime_id: id,
                original_writeup_url: meta.original_url.unwrap_or_default(),
                event_name: meta.event_name,
                task_name: meta.task_name,
                ai_tags: keywords.get(&id).cloned().unwrap_or_default(),
                rag_summary: summaries.get(&id).cloned().unwrap_or_default(),
                rewritten_full_text: rewrites.get(&id).cloned().unwrap_or_default(),
                full_text: full_texts.get(&id).cloned().unwrap_or_default(),
            }
        })
        .collect()
}

fn read_optional(run: &RunDir, relative: Option<&str>, url: &str) -> Option<String> {
    let path = run.resolve(relative?);
    match fs::read_to_string(&path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Could not read text file {} for {url}: {e}", path.display());
            None
        }
    }
}

/// One request per task of every `cleaned` URL, plus the combined text per id.
fn collect_items(
    run: &RunDir,
    manifest: &RunManifest,
) -> (Vec<TransformItem>, HashMap<WriteupId, TaskInfo>) {
    let mut items = Vec::new();
    let mut tasks = HashMap::new();
    for (url, entry) in manifest.urls_with_status(UrlStatus::Cleaned) {
        let UrlState::Cleaned {
            cleaned_text_path,
            cleaned_summary_path,
        } = &entry.state
        else {
            continue;
        };
        let summary = read_optional(run, cleaned_summary_path.as_deref(), url);
        let primary = read_optional(run, cleaned_text_path.as_deref(), url);
        let Some(text) = combine_sources(summary.as_deref(), primary.as_deref()) else {
            warn!("No readable content found for URL {url}. Skipping.");
            continue;
        };
        for task in &entry.tasks {
            items.push(TransformItem {
                ctftime_id: task.ctftime_id,
                event_name: task.event_name.clone(),
                task_name: task.task_name.clone(),
                text: text.clone(),
            });
            tasks.insert(task.ctftime_id, task.clone());
        }
    }
    (items, tasks)
}

/// Metadata from `output/{id}.meta.json`, then the manifest task, then defaults.
fn load_metadata(run: &RunDir, id: WriteupId, tasks: &HashMap<WriteupId, TaskInfo>) -> TaskInfo {
    let path = run.meta_json(id);
    if path.exists() {
        let parsed = fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|body| serde_json::from_str::<TaskInfo>(&body).map_err(|e| e.to_string()));
        match parsed {
            Ok(meta) => return meta,
            Err(e) => warn!("Could not read or parse metadata for {id}: {e}"),
        }
    }
    tasks.get(&id).cloned().unwrap_or_else(|| TaskInfo {
        ctftime_id: id,
        event_name: UNKNOWN_EVENT.to_string(),
        task_name: UNKNOWN_TASK.to_string(),
        original_url: None,
    })
}

/// Runs stage 3 for `run`, writing `ai_processed/{id}.json` per item.
#[instrument(skip_all, fields(run = %run.run_id()))]
pub async fn run_transform_stage(
    run: &RunDir,
    config: &PipelineConfig,
    service: &dyn BatchService,
    cancel: &CancellationToken,
) -> Result<TransformReport, PipelineError> {
    info!(">>> Starting Step 3: AI Batch Processing Pipeline <<<");
    let manifest = RunManifest::load(&run.manifest_path())?;
    run.ensure_layout()?;

    let (items, tasks) = collect_items(run, &manifest);
    let mut report = TransformReport {
        requested: items.len(),
        ..TransformReport::default()
    };
    if items.is_empty() {
        info!("No tasks found with 'cleaned' status to process.");
        return Ok(report);
    }
    let full_texts: HashMap<WriteupId, String> = items
        .iter()
        .map(|item| (item.ctftime_id, item.text.clone()))
        .collect();

    let pipeline_run_id = format!("ctf-pipeline-{}", Utc::now().timestamp());
    info!("Pipeline Run ID: {pipeline_run_id}");
    let stage = BatchTransformStage::new(
        service,
        run,
        PollPolicy::from(&config.batch.poll),
        cancel.clone(),
        pipeline_run_id,
        config.ai.temperature,
    );
    let [rewrite_job, summary_job, keyword_job] = AI_JOB_NAMES;

    info!("--- Stage 1: Rewriting ---");
    let rewrites = stage
        .run(rewrite_job, &config.ai.rewrite_model, &items, REWRITE_PROMPT)
        .await?;
    if rewrites.is_empty() {
        error!("Stage 1 produced no results. Halting pipeline.");
        return Err(PipelineError::NoResults(rewrite_job.to_string()));
    }
    report.rewritten = rewrites.len();
    info!("Stage 1 complete. Rewrote {} articles.", rewrites.len());

    let followups: Vec<TransformItem> = rewrites
        .iter()
        .filter_map(|(id, rewritten)| match tasks.get(id) {
            Some(task) => Some(TransformItem {
                ctftime_id: *id,
                event_name: task.event_name.clone(),
                task_name: task.task_name.clone(),
                text: rewritten.clone(),
            }),
            None => {
                warn!("Could not find original task metadata for ID {id}. Skipping for summary/keywords.");
                None
            }
        })
        .collect();

    info!("--- Stages 2 & 3: Summary and Keyword Jobs ---");
    let (summaries, keywords_raw) = tokio::try_join!(
        stage.run(summary_job, &config.ai.summary_model, &followups, SUMMARIZE_PROMPT),
        stage.run(keyword_job, &config.ai.keyword_model, &followups, KEYWORD_PROMPT),
    )?;
    let keywords: HashMap<WriteupId, Vec<String>> = keywords_raw
        .into_iter()
        .map(|(id, raw)| {
            let parsed = parse_keywords(&raw);
            if parsed.is_empty() && !raw.trim().is_empty() {
                warn!("Could not parse keyword JSON for ID {id}. Defaulting to empty list.");
            }
            (id, parsed)
        })
        .collect();
    report.summarized = summaries.len();
    report.keyworded = keywords.len();
    info!("  Processed {} summaries.", summaries.len());
    info!("  Processed {} keyword sets.", keywords.len());

    info!("--- Merging all results ---");
    let records = assemble_records(&rewrites, &summaries, &keywords, &full_texts, |id| {
        load_metadata(run, id, &tasks)
    });
    for record in records {
        let path = run.record_json(record.ctftime_id);
        let written = serde_json::to_string_pretty(&record)
            .map_err(|e| e.to_string())
            .and_then(|body| fs::write(&path, body).map_err(|e| e.to_string()));
        match written {
            Ok(()) => report.saved += 1,
            Err(e) => error!("Error writing JSON file for ID {}: {e}", record.ctftime_id),
        }
    }
    info!("Saved {} final JSON files.", report.saved);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_fences_are_stripped() {
        let raw = "```json\n[\"sql injection\", \"nmap\"]\n```";
        assert_eq!(parse_keywords(raw), vec!["sql injection", "nmap"]);
        assert!(parse_keywords("sql injection, nmap").is_empty());
        assert!(parse_keywords("{\"a\": 1}").is_empty());
    }

    #[test]
    fn summary_comes_before_writeup() {
        let combined = combine_sources(Some("short"), Some("long")).unwrap();
        assert_eq!(
            combined,
            "--- CTFTIME SUMMARY ---\nshort\n\n--- ORIGINAL WRITEUP ---\nlong"
        );
        assert_eq!(
            combine_sources(None, Some("long")).unwrap(),
            "--- ORIGINAL WRITEUP ---\nlong"
        );
        assert!(combine_sources(None, None).is_none());
    }

    #[test]
    fn assembly_unions_ids_across_jobs() {
        let rewrites = HashMap::from([(1, "r1".to_string()), (2, "r2".to_string())]);
        let summaries = HashMap::from([(1, "s1".to_string())]);
        let keywords = HashMap::from([(2, vec!["xss".to_string()]), (3, vec![])]);
        let full_texts = HashMap::from([(1, "f1".to_string())]);

        let records = assemble_records(&rewrites, &summaries, &keywords, &full_texts, |id| {
            TaskInfo {
                ctftime_id: id,
                event_name: "E".into(),
                task_name: format!("T{id}"),
                original_url: None,
            }
        });

        let ids: Vec<_> = records.iter().map(|r| r.ctftime_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(records[0].rag_summary, "s1");
        assert_eq!(records[0].full_text, "f1");
        assert!(records[0].ai_tags.is_empty());
        assert_eq!(records[1].ai_tags, vec!["xss"]);
        assert_eq!(records[1].rag_summary, "");
        assert_eq!(records[2].rewritten_full_text, "");
        assert_eq!(records[2].task_name, "T3");
    }
}
