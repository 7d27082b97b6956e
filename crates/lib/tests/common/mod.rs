#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Shared setup for the pipeline tests: tracing, a configuration rooted in a
//! temporary directory, and builders for batch result lines and run fixtures.

use ctfrag::config::PipelineConfig;
use ctfrag::manifest::RunManifest;
use ctfrag::run_dir::RunDir;
use ctfrag::types::{TaskInfo, WriteupId};
use dotenvy::dotenv;
use serde_json::json;
use std::path::Path;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        tracing_subscriber::fmt::init();
    });
}

/// Defaults with every path under `root`, no politeness delays and fast polling.
pub fn test_config(root: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.paths.runs_dir = root.join("runs");
    config.paths.rejected_ids_log = root.join("rejected_ids.log");
    config.scraper = config.scraper.without_delays();
    config.batch.poll.initial_interval_ms = 1;
    config.batch.poll.max_interval_ms = 5;
    config.batch.poll.timeout_secs = 5;
    config.vector.work_dir = root.join("vector_index");
    config
}

pub fn task(id: WriteupId, event: &str, name: &str, original_url: Option<&str>) -> TaskInfo {
    TaskInfo {
        ctftime_id: id,
        event_name: event.to_string(),
        task_name: name.to_string(),
        original_url: original_url.map(str::to_string),
    }
}

/// A Gemini batch prediction line answering item `id` with `text`.
pub fn gemini_line(id: WriteupId, text: &str) -> String {
    json!({
        "ctftime_id": id,
        "request": {},
        "response": {
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
        }
    })
    .to_string()
}

/// An embedding prediction line for instance `id`.
pub fn embedding_line(id: &str, document_id: Option<&str>, values: &[f32]) -> String {
    let mut instance = json!({ "id": id, "content": "..." });
    if let Some(doc) = document_id {
        instance["document_id"] = json!(doc);
    }
    json!({
        "instance": instance,
        "predictions": [{ "embeddings": { "values": values } }]
    })
    .to_string()
}

/// A run whose manifest marks each `(url, task)` as scraped, with raw HTML saved.
pub fn scraped_run(root: &Path, items: &[(&str, TaskInfo, Option<&str>, Option<&str>)]) -> RunDir {
    let run = RunDir::new(root.join("runs").join("2025-01-01_00-00-00_run"));
    run.ensure_layout().unwrap();
    let mut manifest = RunManifest::new(run.run_id(), "2025-01-01 00:00:00");
    for (url, task, primary, summary) in items {
        if let Some(html) = primary {
            std::fs::write(run.primary_html(task.ctftime_id), html).unwrap();
        }
        if let Some(html) = summary {
            std::fs::write(run.summary_html(task.ctftime_id), html).unwrap();
        }
        manifest.record_scrape(*url, vec![task.clone()], true);
    }
    manifest.save(&run.manifest_path()).unwrap();
    run
}

pub fn long_text(word: &str, min_chars: usize) -> String {
    let mut text = String::new();
    while text.chars().count() < min_chars {
        text.push_str(word);
        text.push(' ');
    }
    text
}
