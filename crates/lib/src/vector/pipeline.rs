//! # Vector Index Pipeline
//!
//! Runs the selected steps 5-9 in ascending order and stops at the first failure.

use crate::batch::{BatchService, PollPolicy};
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::providers::ai::Embedder;
use crate::providers::db::DocumentStore;
use crate::vector::chunker::Chunker;
use crate::vector::deploy::{run_deploy_step, DeployAction, IndexSelection};
use crate::vector::embed::run_embed_step;
use crate::vector::index::VectorIndex;
use crate::vector::populate::run_populate_step;
use crate::vector::prepare::run_prepare_step;
use crate::vector::probe::run_probe_step;
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VectorStep {
    Prepare = 5,
    Embed = 6,
    Populate = 7,
    Deploy = 8,
    Test = 9,
}

impl VectorStep {
    pub fn from_number(step: u8) -> Option<Self> {
        match step {
            5 => Some(VectorStep::Prepare),
            6 => Some(VectorStep::Embed),
            7 => Some(VectorStep::Populate),
            8 => Some(VectorStep::Deploy),
            9 => Some(VectorStep::Test),
            _ => None,
        }
    }
}

/// Sorted, de-duplicated steps. Unknown numbers are reported and dropped.
pub fn plan_steps(requested: &[u8]) -> Vec<VectorStep> {
    let unique: BTreeSet<u8> = requested.iter().copied().collect();
    unique
        .into_iter()
        .filter_map(|n| {
            let step = VectorStep::from_number(n);
            if step.is_none() {
                warn!("Step {n} is not a valid pipeline step. Skipping.");
            }
            step
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct VectorOptions {
    pub steps: Vec<u8>,
    pub overwrite: bool,
    pub deploy_action: DeployAction,
    pub deploy_index: IndexSelection,
    pub query: Option<String>,
}

impl Default for VectorOptions {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            overwrite: true,
            deploy_action: DeployAction::Deploy,
            deploy_index: IndexSelection::All,
            query: None,
        }
    }
}

/// The collaborators steps 5-9 need.
#[derive(Debug)]
pub struct VectorServices {
    pub store: Box<dyn DocumentStore>,
    /// Needed by step 6.
    pub batch: Option<Box<dyn BatchService>>,
    pub index: Box<dyn VectorIndex>,
    /// Needed by step 9.
    pub embedder: Option<Box<dyn Embedder>>,
    pub chunker: Chunker,
}

fn required<'a, T: ?Sized>(
    service: &'a Option<Box<T>>,
    what: &str,
) -> Result<&'a T, PipelineError> {
    service
        .as_deref()
        .ok_or_else(|| PipelineError::MissingPrerequisite(what.to_string()))
}

async fn run_step(
    step: VectorStep,
    config: &PipelineConfig,
    services: &VectorServices,
    options: &VectorOptions,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let work_dir = config.vector.work_dir.as_path();
    match step {
        VectorStep::Prepare => {
            run_prepare_step(work_dir, services.store.as_ref(), &services.chunker).await?;
        }
        VectorStep::Embed => {
            run_embed_step(
                work_dir,
                required(&services.batch, "a batch service for step 6")?,
                &config.embedding.model,
                PollPolicy::from(&config.batch.poll),
                cancel,
            )
            .await?;
        }
        VectorStep::Populate => {
            run_populate_step(
                work_dir,
                services.index.as_ref(),
                config.vector.summary_index.as_deref(),
                config.vector.detailed_index.as_deref(),
                options.overwrite,
            )
            .await?;
        }
        VectorStep::Deploy => {
            run_deploy_step(
                services.index.as_ref(),
                &config.vector,
                options.deploy_action,
                options.deploy_index,
            )
            .await?;
        }
        VectorStep::Test => {
            run_probe_step(
                required(&services.embedder, "an embedding API for step 9")?,
                services.index.as_ref(),
                &config.vector,
                options.query.as_deref(),
            )
            .await?;
        }
    }
    Ok(())
}

/// Runs the requested steps. Returns the steps that completed.
pub async fn run_vector_pipeline(
    config: &PipelineConfig,
    services: &VectorServices,
    options: &VectorOptions,
    cancel: &CancellationToken,
) -> Result<Vec<VectorStep>, PipelineError> {
    let steps = plan_steps(&options.steps);
    info!("Starting Vector Index pipeline for steps: {:?}", options.steps);
    let mut completed = Vec::with_capacity(steps.len());
    for step in steps {
        let number = step as u8;
        info!("--- Running Step {number} ---");
        if let Err(e) = run_step(step, config, services, options, cancel).await {
            error!("--- Step {number} failed: {e} ---");
            return Err(e);
        }
        info!("--- Step {number} completed successfully ---");
        completed.push(step);
    }
    info!("Vector Index pipeline finished.");
    Ok(completed)
}
