//! # Batch Transformation
//!
//! One prompt template applied to many items as a single batch job. Requests carry
//! the item id as a pass-through field, and result lines are joined back on it.

use crate::batch::{run_batch_job, BatchJobRequest, BatchService, PollPolicy};
use crate::errors::PipelineError;
use crate::run_dir::RunDir;
use crate::types::{id_from_value, WriteupId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const WRITEUP_MARKER: &str = "$writeup";

/// One request of a transformation job.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformItem {
    pub ctftime_id: WriteupId,
    pub event_name: String,
    pub task_name: String,
    pub text: String,
}

/// Substitutes the task context and splits the template around `$writeup`.
///
/// The write-up itself is never interpolated: it travels as its own request part
/// between the returned prefix and suffix.
pub fn render_template(template: &str, event_name: &str, task_name: &str) -> (String, String) {
    let rendered = template
        .replace("$event_name", event_name)
        .replace("$task_name", task_name);
    match rendered.split_once(WRITEUP_MARKER) {
        Some((prefix, suffix)) => (prefix.to_string(), suffix.to_string()),
        None => (rendered, String::new()),
    }
}

/// The request object for one item, including the pass-through id.
pub fn request_line(item: &TransformItem, template: &str, temperature: f32) -> Value {
    let (prefix, suffix) = render_template(template, &item.event_name, &item.task_name);
    json!({
        "request": {
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prefix },
                    { "text": item.text },
                    { "text": suffix }
                ]
            }],
            "generation_config": { "temperature": temperature }
        },
        "ctftime_id": item.ctftime_id
    })
}

fn save_pretty(dir: &Path, id: WriteupId, value: &Value) {
    let path = dir.join(format!("{id}.json"));
    let written = serde_json::to_string_pretty(value)
        .map_err(|e| e.to_string())
        .and_then(|body| fs::write(&path, body).map_err(|e| e.to_string()));
    match written {
        Ok(()) => debug!("Saved {}", path.display()),
        Err(e) => error!("Failed to save {}: {e}", path.display()),
    }
}

fn first_candidate_text(line: &Value) -> Result<String, &'static str> {
    let candidate = line
        .pointer("/response/candidates/0")
        .ok_or("no candidates")?;
    let part = candidate
        .pointer("/content/parts/0")
        .ok_or("no parts in candidate")?;
    Ok(part
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string())
}

/// Parses batch output into `id -> text`.
///
/// Lines that are not JSON, carry no id, or have no candidate text are logged and
/// left out of the map. When `raw_dir` is given, every line with an id is saved there.
pub fn parse_results(jsonl: &str, raw_dir: Option<&Path>) -> HashMap<WriteupId, String> {
    let mut results = HashMap::new();
    for line in jsonl.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let data: Value = match serde_json::from_str(line) {
            Ok(data) => data,
            Err(e) => {
                warn!("Could not parse result line: {e}");
                debug!("   Line: {line}");
                continue;
            }
        };
        let Some(id) = data.get("ctftime_id").and_then(id_from_value) else {
            warn!("Could not find 'ctftime_id' in result line: {line}");
            continue;
        };
        if let Some(dir) = raw_dir {
            save_pretty(dir, id, &data);
        }
        match first_candidate_text(&data) {
            Ok(text) => {
                results.insert(id, text);
            }
            Err(reason) => warn!("No result for ID {id}: {reason}"),
        }
    }
    info!("Successfully parsed {} results.", results.len());
    results
}

/// Runs transformation jobs against one batch service for one pipeline run.
#[derive(Debug)]
pub struct BatchTransformStage<'a> {
    service: &'a dyn BatchService,
    run: &'a RunDir,
    policy: PollPolicy,
    cancel: CancellationToken,
    pipeline_run_id: String,
    temperature: f32,
}

impl<'a> BatchTransformStage<'a> {
    pub fn new(
        service: &'a dyn BatchService,
        run: &'a RunDir,
        policy: PollPolicy,
        cancel: CancellationToken,
        pipeline_run_id: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            service,
            run,
            policy,
            cancel,
            pipeline_run_id: pipeline_run_id.into(),
            temperature,
        }
    }

    pub fn pipeline_run_id(&self) -> &str {
        &self.pipeline_run_id
    }

    fn build_input(&self, job: &str, items: &[TransformItem], template: &str) -> Result<String, PipelineError> {
        let raw_dir = self.run.raw_requests_dir(job);
        fs::create_dir_all(&raw_dir)?;
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let line = request_line(item, template, self.temperature);
            save_pretty(&raw_dir, item.ctftime_id, &line);
            lines.push(serde_json::to_string(&line)?);
        }
        Ok(lines.join("\n"))
    }

    /// Submits `items` as job `job`, waits for it and parses the results.
    ///
    /// A job that fails, times out or is cancelled fails the call.
    pub async fn run(
        &self,
        job: &str,
        model: &str,
        items: &[TransformItem],
        template: &str,
    ) -> Result<HashMap<WriteupId, String>, PipelineError> {
        let display_name = format!("{job}-{}", self.pipeline_run_id);
        info!("Starting batch job: {display_name} ({} requests)", items.len());

        let request = BatchJobRequest {
            display_name,
            model: format!("publishers/google/models/{model}"),
            input_jsonl: self.build_input(job, items, template)?,
            model_parameters: None,
        };
        let output = run_batch_job(self.service, request, &self.policy, &self.cancel).await?;

        let raw_dir = self.run.raw_results_dir(job);
        fs::create_dir_all(&raw_dir)?;
        Ok(parse_results(&output, Some(&raw_dir)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_is_split_around_writeup() {
        let (prefix, suffix) = render_template(
            "Task '$task_name' of '$event_name':\n---\n$writeup\n---\nDone:",
            "ExampleCTF",
            "baby-rop",
        );
        assert_eq!(prefix, "Task 'baby-rop' of 'ExampleCTF':\n---\n");
        assert_eq!(suffix, "\n---\nDone:");
    }

    #[test]
    fn template_without_marker_has_empty_suffix() {
        let (prefix, suffix) = render_template("Summarise $task_name", "E", "T");
        assert_eq!(prefix, "Summarise T");
        assert_eq!(suffix, "");
    }

    #[test]
    fn text_is_never_substituted() {
        let item = TransformItem {
            ctftime_id: 5,
            event_name: "E".into(),
            task_name: "T".into(),
            text: "payload with $task_name and $writeup inside".into(),
        };
        let line = request_line(&item, "before $writeup after", 0.2);
        let parts = &line["request"]["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "before ");
        assert_eq!(parts[1]["text"], "payload with $task_name and $writeup inside");
        assert_eq!(parts[2]["text"], " after");
        assert_eq!(line["ctftime_id"], 5);
    }

    #[test]
    fn incomplete_lines_are_absent_not_empty() {
        let jsonl = [
            r#"{"ctftime_id": 1, "response": {"candidates": [{"content": {"parts": [{"text": "one"}]}}]}}"#,
            r#"{"ctftime_id": "2", "response": {"candidates": [{"content": {"parts": [{"text": "two"}]}}]}}"#,
            r#"{"ctftime_id": 3, "response": {"candidates": []}}"#,
            r#"{"ctftime_id": 4, "response": {"candidates": [{"content": {"parts": []}}]}}"#,
            r#"{"response": {"candidates": [{"content": {"parts": [{"text": "orphan"}]}}]}}"#,
            "not json",
            "",
        ]
        .join("\n");

        let results = parse_results(&jsonl, None);

        assert_eq!(results.len(), 2);
        assert_eq!(results[&1], "one");
        assert_eq!(results[&2], "two");
        assert!(!results.contains_key(&3));
        assert!(!results.contains_key(&4));
    }
}
