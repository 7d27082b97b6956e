//! # ctfrag
//!
//! A retrieval pipeline for CTF write-ups. The intake half scrapes write-ups,
//! cleans their text, rewrites and summarizes them through batch AI jobs and
//! stores the results. The vector half chunks and embeds the stored write-ups,
//! loads them into a vector index and answers questions from it.
//!
//! Every intake stage is resumable: its progress lives in a per-run directory
//! whose `manifest.json` records where each source URL stands.

pub mod ask;
pub mod batch;
pub mod config;
pub mod errors;
pub mod grouping;
pub mod intake;
pub mod ledger;
pub mod manifest;
pub mod prompts;
pub mod providers;
pub mod run_dir;
pub mod types;
pub mod vector;

pub use ask::{Answer, QuestionAnswerer};
pub use config::PipelineConfig;
pub use errors::{PipelineError, PromptError};
pub use intake::{IntakeServices, PipelineRunner, Stage};
pub use manifest::{RunManifest, UrlState, UrlStatus};
pub use run_dir::RunDir;
pub use types::{TaskInfo, WriteupId, WriteupRecord};
pub use vector::{run_vector_pipeline, VectorOptions, VectorServices};
