//! # Pipeline Configuration
//!
//! Every stage receives a `PipelineConfig` by reference instead of reading the
//! environment itself. The configuration is layered:
//!
//! 1. Built-in defaults (the `default_*` functions below).
//! 2. An optional YAML file (`ctfrag.yml` or an explicit path), with `${VAR}` substitution.
//! 3. `CTFRAG_`-prefixed environment variables, `__` separating nested keys
//!    (e.g. `CTFRAG_BATCH__PROJECT_ID`).
//! 4. A few well-known unprefixed variables (`GCP_PROJECT_ID`, `GEMINI_API_KEY`, ...)
//!    that fill values still unset after the layers above.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// The file looked up in the working directory when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ctfrag.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0}")]
    General(String),
    #[error("Config file not found at '{0}'")]
    NotFound(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector: VectorConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Parent directory of every `{timestamp}_run` directory.
    #[serde(default = "default_runs_dir")]
    pub runs_dir: PathBuf,
    /// The cross-run rejection ledger.
    #[serde(default = "default_rejected_ids_log")]
    pub rejected_ids_log: PathBuf,
}

fn default_runs_dir() -> PathBuf {
    PathBuf::from("Intake/runs")
}
fn default_rejected_ids_log() -> PathBuf {
    PathBuf::from("Intake/rejected_ids.log")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            runs_dir: default_runs_dir(),
            rejected_ids_log: default_rejected_ids_log(),
        }
    }
}

/// Scraping limits and politeness delays. Limits use `-1` for "no limit".
#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_pages")]
    pub max_pages: i64,
    #[serde(default = "default_max_writeups")]
    pub max_writeups: i64,
    #[serde(default = "default_row_delay_ms")]
    pub row_delay_ms: u64,
    #[serde(default = "default_row_jitter_ms")]
    pub row_jitter_ms: u64,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,
    #[serde(default = "default_summary_timeout_secs")]
    pub summary_timeout_secs: u64,
    #[serde(default = "default_content_timeout_secs")]
    pub content_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://ctftime.org".to_string()
}
fn default_max_pages() -> i64 {
    -1
}
fn default_max_writeups() -> i64 {
    500
}
fn default_row_delay_ms() -> u64 {
    1000
}
fn default_row_jitter_ms() -> u64 {
    250
}
fn default_page_delay_ms() -> u64 {
    1000
}
fn default_fetch_delay_ms() -> u64 {
    1000
}
fn default_summary_timeout_secs() -> u64 {
    10
}
fn default_content_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    format!("ctfrag/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            max_pages: default_max_pages(),
            max_writeups: default_max_writeups(),
            row_delay_ms: default_row_delay_ms(),
            row_jitter_ms: default_row_jitter_ms(),
            page_delay_ms: default_page_delay_ms(),
            fetch_delay_ms: default_fetch_delay_ms(),
            summary_timeout_secs: default_summary_timeout_secs(),
            content_timeout_secs: default_content_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ScraperConfig {
    pub fn page_limit(&self) -> Option<usize> {
        limit(self.max_pages)
    }

    pub fn writeup_limit(&self) -> Option<usize> {
        limit(self.max_writeups)
    }

    /// A configuration with every politeness delay set to zero. Used by tests.
    pub fn without_delays(mut self) -> Self {
        self.row_delay_ms = 0;
        self.row_jitter_ms = 0;
        self.page_delay_ms = 0;
        self.fetch_delay_ms = 0;
        self
    }
}

fn limit(value: i64) -> Option<usize> {
    if value < 0 {
        None
    } else {
        Some(value as usize)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Extracted text shorter than this many characters counts as low quality.
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
}

fn default_min_content_length() -> usize {
    300
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_content_length: default_min_content_length(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_rewrite_model")]
    pub rewrite_model: String,
    #[serde(default = "default_flash_model")]
    pub summary_model: String,
    #[serde(default = "default_flash_model")]
    pub keyword_model: String,
    #[serde(default = "default_ai_temperature")]
    pub temperature: f32,
}

fn default_rewrite_model() -> String {
    "gemini-2.5-pro".to_string()
}
fn default_flash_model() -> String {
    "gemini-2.5-flash".to_string()
}
fn default_ai_temperature() -> f32 {
    0.2
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            rewrite_model: default_rewrite_model(),
            summary_model: default_flash_model(),
            keyword_model: default_flash_model(),
            temperature: default_ai_temperature(),
        }
    }
}

/// Where and how batch prediction jobs are submitted.
#[derive(Debug, Deserialize, Clone)]
pub struct BatchConfig {
    #[serde(default = "default_vertex_api_url")]
    pub vertex_api_url: String,
    #[serde(default = "default_storage_api_url")]
    pub storage_api_url: String,
    #[serde(default = "default_storage_upload_url")]
    pub storage_upload_url: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_vertex_api_url() -> String {
    "https://us-central1-aiplatform.googleapis.com".to_string()
}
fn default_storage_api_url() -> String {
    "https://storage.googleapis.com/storage/v1".to_string()
}
fn default_storage_upload_url() -> String {
    "https://storage.googleapis.com/upload/storage/v1".to_string()
}
fn default_location() -> String {
    "us-central1".to_string()
}
fn default_bucket() -> String {
    "ctf-rag".to_string()
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            vertex_api_url: default_vertex_api_url(),
            storage_api_url: default_storage_api_url(),
            storage_upload_url: default_storage_upload_url(),
            project_id: None,
            location: default_location(),
            bucket: default_bucket(),
            access_token: None,
            poll: PollConfig::default(),
        }
    }
}

/// Exponential backoff used while waiting on a batch job.
#[derive(Debug, Deserialize, Clone)]
pub struct PollConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_poll_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_initial_interval_ms() -> u64 {
    5_000
}
fn default_max_interval_ms() -> u64 {
    60_000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_poll_timeout_secs() -> u64 {
    24 * 60 * 60
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            timeout_secs: default_poll_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Path of the turso database holding the `writeups` table.
    #[serde(default = "default_storage_db_url")]
    pub db_url: String,
}

fn default_storage_db_url() -> String {
    "db/ctf_writeups.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_url: default_storage_db_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Window size in tokens.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Tokens shared by consecutive windows.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
}

fn default_window() -> usize {
    500
}
fn default_overlap() -> usize {
    75
}
fn default_encoding() -> String {
    "cl100k_base".to_string()
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            overlap: default_overlap(),
            encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Model used by the batch embedding jobs.
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Endpoint used for ad hoc (query-time) embeddings. When unset, the
    /// Vertex AI `:predict` endpoint of `model` is used so query vectors match
    /// the batch-embedded ones.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_embedding_model() -> String {
    "text-embedding-005".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorConfig {
    #[serde(default = "default_vector_db_url")]
    pub db_url: String,
    /// Directory for the step 5-7 artifacts (JSONL inputs, embeddings, manifests).
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_summary_index")]
    pub summary_index: Option<String>,
    #[serde(default = "default_detailed_index")]
    pub detailed_index: Option<String>,
    #[serde(default = "default_summary_endpoint")]
    pub summary_endpoint: Option<String>,
    #[serde(default = "default_detailed_endpoint")]
    pub detailed_endpoint: Option<String>,
    #[serde(default = "default_test_neighbors")]
    pub test_neighbors: usize,
    #[serde(default = "default_query")]
    pub default_query: String,
}

fn default_vector_db_url() -> String {
    "db/ctf_vectors.db".to_string()
}
fn default_work_dir() -> PathBuf {
    PathBuf::from("vector_index")
}
fn default_summary_index() -> Option<String> {
    Some("summary".to_string())
}
fn default_detailed_index() -> Option<String> {
    Some("detailed".to_string())
}
fn default_summary_endpoint() -> Option<String> {
    Some("ctf-summary-endpoint".to_string())
}
fn default_detailed_endpoint() -> Option<String> {
    Some("ctf-detailed-endpoint".to_string())
}
fn default_test_neighbors() -> usize {
    3
}
fn default_query() -> String {
    "What is the vulnerability in vsftpd 2.3.4?".to_string()
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            db_url: default_vector_db_url(),
            work_dir: default_work_dir(),
            summary_index: default_summary_index(),
            detailed_index: default_detailed_index(),
            summary_endpoint: default_summary_endpoint(),
            detailed_endpoint: default_detailed_endpoint(),
            test_neighbors: default_test_neighbors(),
            default_query: default_query(),
        }
    }
}

/// Settings for `ctfrag ask`.
#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    /// Base URL of the Gemini models API.
    #[serde(default = "default_answer_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_rewrite_model")]
    pub model: String,
    #[serde(default = "default_answer_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_answer_neighbors")]
    pub neighbors: usize,
}

fn default_answer_api_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}
fn default_answer_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}
fn default_answer_neighbors() -> usize {
    5
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            api_url: default_answer_api_url(),
            api_key: None,
            model: default_rewrite_model(),
            temperature: default_answer_temperature(),
            top_p: default_top_p(),
            neighbors: default_answer_neighbors(),
        }
    }
}

impl AnswerConfig {
    /// `{api_url}/{model}:generateContent`
    pub fn generate_content_url(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            self.model
        )
    }
}

impl PipelineConfig {
    /// Loads the configuration from `.env`, the YAML file and the environment.
    ///
    /// An explicit `path` must exist; the default `ctfrag.yml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = ConfigBuilder::builder();
        let file_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        match read_and_substitute(&file_path)? {
            Some(content) => {
                info!("Loading configuration from '{}'.", file_path.display());
                builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
            }
            None if path.is_some() => {
                return Err(ConfigError::NotFound(file_path.display().to_string()));
            }
            None => {}
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("CTFRAG")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: PipelineConfig = settings.try_deserialize()?;
        config.apply_env_fallbacks(|key| env::var(key).ok().filter(|v| !v.is_empty()));
        config.validate()?;
        Ok(config)
    }

    /// Fills still-unset values from well-known, unprefixed variables.
    ///
    /// Values that still hold their built-in default count as unset.
    pub fn apply_env_fallbacks<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fill(&mut self.batch.project_id, lookup("GCP_PROJECT_ID"));
        fill(&mut self.batch.access_token, lookup("GCP_ACCESS_TOKEN"));
        fill(&mut self.answer.api_key, lookup("GEMINI_API_KEY"));
        fill(&mut self.embedding.api_key, lookup("EMBEDDINGS_API_KEY"));
        fill(&mut self.embedding.api_key, lookup("GEMINI_API_KEY"));
        fill(&mut self.embedding.api_url, lookup("EMBEDDINGS_API_URL"));
        replace_default(
            &mut self.vector.summary_endpoint,
            default_summary_endpoint(),
            lookup("SUMMARY_ENDPOINT_NAME").map(Some),
        );
        replace_default(
            &mut self.vector.detailed_endpoint,
            default_detailed_endpoint(),
            lookup("DETAILED_ENDPOINT_NAME").map(Some),
        );
        replace_default(
            &mut self.storage.db_url,
            default_storage_db_url(),
            lookup("DB_URL"),
        );
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.window == 0 {
            return Err(ConfigError::Invalid("chunking.window must be > 0".into()));
        }
        if self.chunking.overlap >= self.chunking.window {
            return Err(ConfigError::Invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.window ({})",
                self.chunking.overlap, self.chunking.window
            )));
        }
        if self.batch.poll.initial_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "batch.poll.initial_interval_ms must be > 0".into(),
            ));
        }
        if self.batch.poll.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "batch.poll.multiplier must be >= 1.0".into(),
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// The endpoint for query-time embeddings, derived from the batch settings
    /// when not configured explicitly.
    pub fn embedding_api_url(&self) -> Option<String> {
        if let Some(url) = &self.embedding.api_url {
            return Some(url.clone());
        }
        let project = self.batch.project_id.as_deref()?;
        Some(format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            self.batch.vertex_api_url.trim_end_matches('/'),
            project,
            self.batch.location,
            self.embedding.model
        ))
    }

    /// The credential sent with query-time embedding requests.
    pub fn embedding_api_key(&self) -> Option<String> {
        if self.embedding.api_url.is_none() {
            self.batch.access_token.clone()
        } else {
            self.embedding.api_key.clone()
        }
    }
}

impl PollConfig {
    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn replace_default<T: PartialEq>(slot: &mut T, default: T, value: Option<T>) {
    if let Some(value) = value {
        if *slot == default {
            *slot = value;
        }
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

// Reads a file and substitutes `${VAR}` references with environment values.
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        ConfigError::General(format!(
            "Failed to read config file '{}': {e}",
            path.display()
        ))
    })?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(e.to_string()))?;
    let expanded = re.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = PipelineConfig::default();
        assert_eq!(config.extraction.min_content_length, 300);
        assert_eq!(config.chunking.window, 500);
        assert_eq!(config.chunking.overlap, 75);
        assert_eq!(config.scraper.writeup_limit(), Some(500));
        assert_eq!(config.scraper.page_limit(), None);
        assert_eq!(config.ai.rewrite_model, "gemini-2.5-pro");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "extraction:\n  min_content_length: 42\nchunking:\n  window: 100\n  overlap: 10\n"
        )
        .unwrap();

        let config = PipelineConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.extraction.min_content_length, 42);
        assert_eq!(config.chunking.window, 100);
        assert_eq!(config.chunking.overlap, 10);
        assert_eq!(config.scraper.base_url, "https://ctftime.org");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let result = PipelineConfig::load(Some(Path::new("/definitely/not/here.yml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        let mut config = PipelineConfig::default();
        config.chunking.overlap = 500;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn env_fallbacks_only_fill_unset_values() {
        let vars: HashMap<&str, &str> = [
            ("GCP_PROJECT_ID", "from-env"),
            ("GEMINI_API_KEY", "gemini-key"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config.answer.api_key = Some("explicit".to_string());

        config.apply_env_fallbacks(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.batch.project_id.as_deref(), Some("from-env"));
        assert_eq!(config.answer.api_key.as_deref(), Some("explicit"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("gemini-key"));
    }

    #[test]
    fn env_fallbacks_keep_explicit_endpoints_and_db_url() {
        let vars: HashMap<&str, &str> = [
            ("EMBEDDINGS_API_URL", "http://env-embed"),
            ("SUMMARY_ENDPOINT_NAME", "env-ep"),
            ("DETAILED_ENDPOINT_NAME", "env-detailed"),
            ("DB_URL", "env-db"),
        ]
        .into_iter()
        .collect();
        let mut config = PipelineConfig::default();
        config.storage.db_url = "libsql://explicit".to_string();
        config.vector.summary_endpoint = Some("explicit-endpoint".to_string());
        config.embedding.api_url = Some("http://explicit-embed".to_string());

        config.apply_env_fallbacks(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage.db_url, "libsql://explicit");
        assert_eq!(config.vector.summary_endpoint.as_deref(), Some("explicit-endpoint"));
        assert_eq!(config.embedding.api_url.as_deref(), Some("http://explicit-embed"));
        assert_eq!(config.vector.detailed_endpoint.as_deref(), Some("env-detailed"));

        let mut defaults = PipelineConfig::default();
        defaults.apply_env_fallbacks(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(defaults.storage.db_url, "env-db");
        assert_eq!(defaults.vector.summary_endpoint.as_deref(), Some("env-ep"));
        assert_eq!(defaults.embedding.api_url.as_deref(), Some("http://env-embed"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let mut config = PipelineConfig::default();
        config.batch.poll.initial_interval_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn embedding_url_defaults_to_vertex_predict() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.embedding_api_url(), None);

        config.batch.project_id = Some("proj".into());
        config.batch.access_token = Some("token".into());

        assert_eq!(
            config.embedding_api_url().as_deref(),
            Some("https://us-central1-aiplatform.googleapis.com/v1/projects/proj/locations/us-central1/publishers/google/models/text-embedding-005:predict")
        );
        assert_eq!(config.embedding_api_key().as_deref(), Some("token"));
    }
}
