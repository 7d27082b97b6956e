use thiserror::Error;

/// Errors raised while talking to a generative or embedding API.
#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to AI API: {0}")]
    AiRequest(reqwest::Error),
    #[error("Failed to deserialize AI API response: {0}")]
    AiDeserialization(reqwest::Error),
    #[error("AI API returned an error: {0}")]
    AiApi(String),
    #[error("API key is missing")]
    MissingApiKey,
}

/// The umbrella error for a pipeline stage or step.
///
/// Anything that reaches the runner as a `PipelineError` halts the run; per-item
/// problems are logged inside the stages and never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
    #[error("Manifest error: {0}")]
    Manifest(#[from] crate::manifest::ManifestError),
    #[error("Rejection ledger error: {0}")]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error("Batch job error: {0}")]
    Batch(#[from] crate::batch::BatchError),
    #[error("Document store error: {0}")]
    Store(#[from] crate::providers::db::StoreError),
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] crate::vector::index::VectorIndexError),
    #[error("AI provider error: {0}")]
    Prompt(#[from] PromptError),
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
    #[error("Missing prerequisite: {0}")]
    MissingPrerequisite(String),
    #[error("Stage '{0}' produced no results")]
    NoResults(String),
}
