//! # Run Directory Layout
//!
//! Every intake run owns one directory. Stages find their inputs and outputs
//! through `RunDir` instead of joining path fragments themselves.

use crate::manifest::MANIFEST_FILE_NAME;
use crate::types::WriteupId;
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};

pub const OUTPUT_DIR: &str = "output";
pub const CLEANED_DIR: &str = "processed_trafilatura";
pub const AI_PROCESSED_DIR: &str = "ai_processed";
pub const RAW_REQUESTS_DIR: &str = "raw_requests";
pub const RAW_RESULTS_DIR: &str = "raw_ai_processed";
pub const PIPELINE_LOG: &str = "pipeline.log";

/// The three batch jobs of the AI stage, in execution order.
pub const AI_JOB_NAMES: [&str; 3] = ["1_rewrite", "2_summarize", "3_keywords"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    root: PathBuf,
}

/// `2025-01-31_13-05-09_run`
pub fn run_id_for(now: DateTime<Local>) -> String {
    format!("{}_run", now.format("%Y-%m-%d_%H-%M-%S"))
}

impl RunDir {
    /// Wraps an existing (or to-be-created) run directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a fresh, timestamped run directory under `runs_dir`.
    pub fn create_new(runs_dir: &Path, now: DateTime<Local>) -> std::io::Result<Self> {
        let run_dir = Self::new(runs_dir.join(run_id_for(now)));
        run_dir.ensure_layout()?;
        Ok(run_dir)
    }

    /// Creates every sub-directory a run uses. Safe to call repeatedly.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.output_dir())?;
        fs::create_dir_all(self.cleaned_dir())?;
        fs::create_dir_all(self.ai_processed_dir())?;
        for job in AI_JOB_NAMES {
            fs::create_dir_all(self.raw_requests_dir(job))?;
            fs::create_dir_all(self.raw_results_dir(job))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The directory name, used as the manifest `run_id`.
    pub fn run_id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(PIPELINE_LOG)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub fn cleaned_dir(&self) -> PathBuf {
        self.root.join(CLEANED_DIR)
    }

    pub fn ai_processed_dir(&self) -> PathBuf {
        self.root.join(AI_PROCESSED_DIR)
    }

    pub fn raw_requests_dir(&self, job: &str) -> PathBuf {
        self.root.join(RAW_REQUESTS_DIR).join(job)
    }

    pub fn raw_results_dir(&self, job: &str) -> PathBuf {
        self.root.join(RAW_RESULTS_DIR).join(job)
    }

    pub fn primary_html(&self, id: WriteupId) -> PathBuf {
        self.output_dir().join(format!("{id}.html"))
    }

    pub fn summary_html(&self, id: WriteupId) -> PathBuf {
        self.output_dir().join(format!("{id}.summary.html"))
    }

    pub fn meta_json(&self, id: WriteupId) -> PathBuf {
        self.output_dir().join(format!("{id}.meta.json"))
    }

    pub fn record_json(&self, id: WriteupId) -> PathBuf {
        self.ai_processed_dir().join(format!("{id}.json"))
    }

    /// Resolves a manifest-relative path against the run root.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}
