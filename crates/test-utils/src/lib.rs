use anyhow::Result;
use async_trait::async_trait;
use ctfrag::batch::{BatchError, BatchJob, BatchJobRequest, BatchService, JobState, JobStatus};
use ctfrag::errors::PromptError;
use ctfrag::intake::{
    ContentExtractor, ExtractError, ListingRow, SourceError, SummaryDetails, WriteupSource,
};
use ctfrag::providers::ai::{AiProvider, Embedder};
use ctfrag::providers::db::TursoDocumentStore;
use ctfrag::vector::TursoVectorIndex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use turso::Database;

// --- Test Setup ---

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub db: Database,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database and initializes the schema.
    pub async fn new() -> Result<Self> {
        let db = turso::Builder::new_local(":memory:").build().await?;
        let conn = db.connect()?;

        // Initialize the schema using the shared SQL constants.
        for statement in ctfrag::providers::db::sqlite::sql::ALL_TABLE_CREATION_SQL {
            conn.execute(statement, ()).await?;
        }

        Ok(Self { db })
    }

    pub async fn document_store(&self) -> Result<TursoDocumentStore> {
        Ok(TursoDocumentStore::from_database(self.db.clone()).await?)
    }

    pub async fn vector_index(&self) -> Result<TursoVectorIndex> {
        Ok(TursoVectorIndex::from_database(self.db.clone()).await?)
    }
}

// --- Mock AI Provider ---

#[derive(Clone, Debug)]
pub struct MockAiProvider {
    responses: Arc<Mutex<HashMap<String, String>>>,
    calls: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pre-programs a response for a specific prompt.
    /// The key should be a unique substring of the system or user prompt.
    pub fn add_response(&self, key: &str, response: &str) {
        let mut responses = self.responses.lock().unwrap();
        responses.insert(key.to_string(), response.to_string());
    }

    /// Retrieves the recorded calls for assertion.
    pub fn get_calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, PromptError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((system_prompt.to_string(), user_prompt.to_string()));

        let responses = self.responses.lock().unwrap();
        for (key, response) in responses.iter() {
            if system_prompt.contains(key) || user_prompt.contains(key) {
                return Ok(response.clone());
            }
        }

        Err(PromptError::AiApi(format!(
            "MockAiProvider: No response programmed. Got user prompt: '{user_prompt}'"
        )))
    }
}

// --- Mock Embedder ---

/// Returns a programmed vector for a text, or the fallback for anything else.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    fallback: Vec<f32>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: Arc::new(Mutex::new(HashMap::new())),
            fallback,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_vector(&self, text: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .unwrap()
            .insert(text.to_string(), vector);
    }

    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, PromptError> {
        self.calls.lock().unwrap().push(text.to_string());
        Ok(self
            .vectors
            .lock()
            .unwrap()
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

// --- Scripted Batch Service ---

#[derive(Clone, Debug)]
enum Script {
    Succeed(String),
    Fail(JobState),
    Hang,
}

/// A batch service whose jobs finish as scripted, matched by display-name prefix.
///
/// Jobs without a script succeed with empty output.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBatchService {
    scripts: Arc<Mutex<Vec<(String, Script)>>>,
    submitted: Arc<Mutex<Vec<BatchJobRequest>>>,
}

impl ScriptedBatchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs whose display name starts with `prefix` succeed with `results_jsonl`.
    pub fn succeed(&self, prefix: &str, results_jsonl: &str) -> &Self {
        self.push(prefix, Script::Succeed(results_jsonl.to_string()))
    }

    pub fn fail(&self, prefix: &str, state: JobState) -> &Self {
        self.push(prefix, Script::Fail(state))
    }

    /// Jobs that never leave the running state.
    pub fn hang(&self, prefix: &str) -> &Self {
        self.push(prefix, Script::Hang)
    }

    fn push(&self, prefix: &str, script: Script) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .push((prefix.to_string(), script));
        self
    }

    fn script_for(&self, display_name: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| display_name.starts_with(prefix.as_str()))
            .map(|(_, script)| script.clone())
            .unwrap_or(Script::Succeed(String::new()))
    }

    pub fn submitted(&self) -> Vec<BatchJobRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// Parsed request lines of the first submitted job whose name starts with `prefix`.
    pub fn request_lines(&self, prefix: &str) -> Vec<Value> {
        self.submitted()
            .into_iter()
            .find(|r| r.display_name.starts_with(prefix))
            .map(|r| {
                r.input_jsonl
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(|l| serde_json::from_str(l).unwrap())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl BatchService for ScriptedBatchService {
    async fn submit(&self, request: BatchJobRequest) -> Result<BatchJob, BatchError> {
        let job = BatchJob {
            name: format!("batchPredictionJobs/{}", request.display_name),
            display_name: request.display_name.clone(),
            output_prefix: format!("mock://{}", request.display_name),
        };
        self.submitted.lock().unwrap().push(request);
        Ok(job)
    }

    async fn status(&self, job: &BatchJob) -> Result<JobStatus, BatchError> {
        let state = match self.script_for(&job.display_name) {
            Script::Succeed(_) => JobState::Succeeded,
            Script::Fail(state) => state,
            Script::Hang => JobState::Running,
        };
        let error = (!state.is_success() && state.is_terminal())
            .then(|| "scripted failure".to_string());
        Ok(JobStatus { state, error })
    }

    async fn fetch_results(&self, job: &BatchJob) -> Result<String, BatchError> {
        match self.script_for(&job.display_name) {
            Script::Succeed(results) => Ok(results),
            _ => Err(BatchError::Malformed(format!(
                "no results for '{}'",
                job.display_name
            ))),
        }
    }
}

// --- Mock Writeup Source ---

/// An in-memory CTFtime: listing pages, summary pages and external bodies.
#[derive(Clone, Debug, Default)]
pub struct MockWriteupSource {
    pages: Arc<Mutex<Vec<Vec<ListingRow>>>>,
    summaries: Arc<Mutex<HashMap<String, SummaryDetails>>>,
    contents: Arc<Mutex<HashMap<String, String>>>,
    fetched: Arc<Mutex<Vec<String>>>,
}

impl MockWriteupSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_page(&self, rows: Vec<ListingRow>) -> &Self {
        self.pages.lock().unwrap().push(rows);
        self
    }

    pub fn add_summary(&self, summary_url: &str, details: SummaryDetails) -> &Self {
        self.summaries
            .lock()
            .unwrap()
            .insert(summary_url.to_string(), details);
        self
    }

    /// External content served for `url`. Unknown URLs fail to fetch.
    pub fn add_content(&self, url: &str, body: &str) -> &Self {
        self.contents
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl WriteupSource for MockWriteupSource {
    async fn listing_page(&self, page: usize) -> Result<Option<Vec<ListingRow>>, SourceError> {
        let pages = self.pages.lock().unwrap();
        Ok(Some(
            page.checked_sub(1)
                .and_then(|i| pages.get(i))
                .cloned()
                .unwrap_or_default(),
        ))
    }

    async fn summary(&self, summary_url: &str) -> Result<SummaryDetails, SourceError> {
        self.summaries
            .lock()
            .unwrap()
            .get(summary_url)
            .cloned()
            .ok_or_else(|| SourceError(format!("404 for {summary_url}")))
    }

    async fn fetch_content(&self, url: &str) -> Result<String, SourceError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.contents
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError(format!("404 for {url}")))
    }
}

// --- Tag-stripping Extractor ---

/// Drops everything between `<` and `>` and trims the rest.
///
/// A document containing `<!-- broken -->` fails extraction.
#[derive(Clone, Copy, Debug, Default)]
pub struct TagStrippingExtractor;

impl ContentExtractor for TagStrippingExtractor {
    fn extract(&self, html: &str) -> Result<String, ExtractError> {
        if html.contains("<!-- broken -->") {
            return Err(ExtractError("unparseable document".to_string()));
        }
        let mut text = String::with_capacity(html.len());
        let mut in_tag = false;
        for c in html.chars() {
            match c {
                '<' => in_tag = true,
                '>' => in_tag = false,
                c if !in_tag => text.push(c),
                _ => {}
            }
        }
        Ok(text.trim().to_string())
    }
}
