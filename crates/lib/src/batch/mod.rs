//! # Batch Prediction Service
//!
//! AI transformations and bulk embeddings run as provider-managed batch jobs:
//! a JSONL file of requests goes in, a JSONL file of responses comes out, and
//! lines are joined back to items through a pass-through identifier.
//!
//! Waiting is a bounded polling loop with exponential backoff, an overall
//! timeout and a cancellation token.

pub mod vertex;

use crate::config::PollConfig;
use async_trait::async_trait;
use dyn_clone::DynClone;
use serde_json::Value;
use std::fmt::{self, Debug};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use vertex::VertexBatchService;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Batch service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Batch service returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Batch service is not configured: {0}")]
    MissingConfig(String),
    #[error("Unexpected batch service response: {0}")]
    Malformed(String),
    #[error("Batch job '{job}' ended in state {state}: {message}")]
    JobFailed {
        job: String,
        state: JobState,
        message: String,
    },
    #[error("Timed out after {elapsed:?} waiting for batch job '{job}'")]
    Timeout { job: String, elapsed: Duration },
    #[error("Waiting for batch job '{0}' was cancelled")]
    Cancelled(String),
}

/// Everything needed to submit one batch job.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJobRequest {
    pub display_name: String,
    /// Publisher model path, e.g. `publishers/google/models/gemini-2.5-flash`.
    pub model: String,
    /// Newline-delimited request objects.
    pub input_jsonl: String,
    pub model_parameters: Option<Value>,
}

/// A handle to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    /// The provider's resource name, used for polling.
    pub name: String,
    pub display_name: String,
    /// Object prefix under which the provider writes its predictions.
    pub output_prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelling,
    Cancelled,
    Expired,
    PartiallySucceeded,
    Unknown(String),
}

impl JobState {
    /// Maps a `JOB_STATE_*` string.
    pub fn from_api(state: &str) -> Self {
        match state {
            "JOB_STATE_QUEUED" => JobState::Queued,
            "JOB_STATE_PENDING" => JobState::Pending,
            "JOB_STATE_RUNNING" | "JOB_STATE_UPDATING" => JobState::Running,
            "JOB_STATE_SUCCEEDED" => JobState::Succeeded,
            "JOB_STATE_FAILED" => JobState::Failed,
            "JOB_STATE_CANCELLING" => JobState::Cancelling,
            "JOB_STATE_CANCELLED" => JobState::Cancelled,
            "JOB_STATE_EXPIRED" => JobState::Expired,
            "JOB_STATE_PARTIALLY_SUCCEEDED" => JobState::PartiallySucceeded,
            other => JobState::Unknown(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded
                | JobState::Failed
                | JobState::Cancelled
                | JobState::Expired
                | JobState::PartiallySucceeded
        )
    }

    pub fn is_success(&self) -> bool {
        *self == JobState::Succeeded
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Unknown(raw) => write!(f, "{raw}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatus {
    pub state: JobState,
    pub error: Option<String>,
}

#[async_trait]
pub trait BatchService: Send + Sync + Debug + DynClone {
    async fn submit(&self, request: BatchJobRequest) -> Result<BatchJob, BatchError>;

    async fn status(&self, job: &BatchJob) -> Result<JobStatus, BatchError>;

    /// The concatenated prediction JSONL of a finished job.
    async fn fetch_results(&self, job: &BatchJob) -> Result<String, BatchError>;
}

dyn_clone::clone_trait_object!(BatchService);

/// Backoff settings for [`wait_for_completion`].
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
    pub timeout: Duration,
}

impl PollPolicy {
    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

impl From<&PollConfig> for PollPolicy {
    fn from(config: &PollConfig) -> Self {
        Self {
            initial_interval: config.initial_interval(),
            max_interval: config.max_interval(),
            multiplier: config.multiplier.max(1.0),
            timeout: config.timeout(),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

/// Polls `job` until it reaches a terminal state.
///
/// Returns the final status when the job succeeded. Any other terminal state is
/// a [`BatchError::JobFailed`].
pub async fn wait_for_completion(
    service: &dyn BatchService,
    job: &BatchJob,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<JobStatus, BatchError> {
    let started = Instant::now();
    let mut interval = policy.initial_interval;

    loop {
        if cancel.is_cancelled() {
            return Err(BatchError::Cancelled(job.display_name.clone()));
        }

        let status = service.status(job).await?;
        debug!("Job '{}' is in state {}.", job.display_name, status.state);

        if status.state.is_terminal() {
            if status.state.is_success() {
                info!("Job '{}' succeeded.", job.display_name);
                return Ok(status);
            }
            return Err(BatchError::JobFailed {
                job: job.display_name.clone(),
                message: status
                    .error
                    .clone()
                    .unwrap_or_else(|| "no error message".to_string()),
                state: status.state,
            });
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            warn!(
                "Giving up on job '{}' after {elapsed:?}.",
                job.display_name
            );
            return Err(BatchError::Timeout {
                job: job.display_name.clone(),
                elapsed,
            });
        }

        let remaining = policy.timeout - elapsed;
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(BatchError::Cancelled(job.display_name.clone()));
            }
            _ = sleep(interval.min(remaining)) => {}
        }
        interval = policy.next_interval(interval);
    }
}

/// Submits a job, waits for it and returns its result JSONL.
pub async fn run_batch_job(
    service: &dyn BatchService,
    request: BatchJobRequest,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> Result<String, BatchError> {
    let display_name = request.display_name.clone();
    let job = service.submit(request).await?;
    info!("Submitted batch job '{display_name}' ({}).", job.name);
    wait_for_completion(service, &job, policy, cancel).await?;
    service.fetch_results(&job).await
}
