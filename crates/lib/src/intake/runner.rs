//! # Pipeline Runner
//!
//! Runs the intake stages in their fixed order against one run directory and
//! stops at the first stage that fails.

use crate::batch::BatchService;
use crate::config::PipelineConfig;
use crate::errors::PipelineError;
use crate::intake::ai::{run_transform_stage, TransformReport};
use crate::intake::extract::{run_extraction_stage, ContentExtractor, ExtractReport};
use crate::intake::scrape::{run_scrape_stage, ScrapeReport, WriteupSource};
use crate::intake::store::{run_store_stage, StoreReport};
use crate::providers::db::DocumentStore;
use crate::run_dir::RunDir;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Scrape,
    Extract,
    Transform,
    Store,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Scrape, Stage::Extract, Stage::Transform, Stage::Store];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Store => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageReport {
    Scrape(ScrapeReport),
    Extract(ExtractReport),
    Transform(TransformReport),
    Store(StoreReport),
}

/// The external collaborators of the intake stages.
#[derive(Debug)]
pub struct IntakeServices {
    pub source: Box<dyn WriteupSource>,
    pub extractor: Box<dyn ContentExtractor>,
    /// Needed by the transform stage.
    pub batch: Option<Box<dyn BatchService>>,
    /// Needed by the store stage. The scrape stage treats a missing store as empty.
    pub store: Option<Box<dyn DocumentStore>>,
}

#[derive(Debug)]
pub struct PipelineRunner<'a> {
    config: &'a PipelineConfig,
    services: IntakeServices,
    cancel: CancellationToken,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(config: &'a PipelineConfig, services: IntakeServices) -> Self {
        Self {
            config,
            services,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` for every batch job wait.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run_stage(&self, stage: Stage, run: &RunDir) -> Result<StageReport, PipelineError> {
        info!("--- Running stage '{stage}' ---");
        let report = match stage {
            Stage::Scrape => StageReport::Scrape(
                run_scrape_stage(
                    run,
                    self.config,
                    self.services.source.as_ref(),
                    self.services.store.as_deref(),
                )
                .await?,
            ),
            Stage::Extract => StageReport::Extract(
                run_extraction_stage(run, self.config, self.services.extractor.as_ref()).await?,
            ),
            Stage::Transform => {
                let batch = self.services.batch.as_deref().ok_or_else(|| {
                    PipelineError::MissingPrerequisite(
                        "a batch service for the transform stage".into(),
                    )
                })?;
                StageReport::Transform(
                    run_transform_stage(run, self.config, batch, &self.cancel).await?,
                )
            }
            Stage::Store => {
                let store = self.services.store.as_deref().ok_or_else(|| {
                    PipelineError::MissingPrerequisite("a document store for the store stage".into())
                })?;
                StageReport::Store(run_store_stage(run, store).await?)
            }
        };
        info!("--- Stage '{stage}' finished successfully ---");
        Ok(report)
    }

    /// Runs every stage in order. The first failure halts the run.
    pub async fn run_all(&self, run: &RunDir) -> Result<Vec<StageReport>, PipelineError> {
        info!(">>> Starting CTF Processing Pipeline. RUN_ID: {} <<<", run.run_id());
        let mut reports = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            match self.run_stage(stage, run).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!("Stage '{stage}' failed: {e}");
                    error!(">>> Pipeline halted due to a critical error. <<<");
                    return Err(e);
                }
            }
        }
        info!(
            ">>> All pipeline stages for RUN_ID: {} executed successfully! <<<",
            run.run_id()
        );
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_parse_by_name() {
        assert_eq!("extract".parse::<Stage>().unwrap(), Stage::Extract);
        assert_eq!(" Store ".parse::<Stage>().unwrap(), Stage::Store);
        assert!("clean".parse::<Stage>().is_err());
    }

    #[test]
    fn stages_run_in_fixed_order() {
        let mut shuffled = vec![Stage::Store, Stage::Scrape, Stage::Transform, Stage::Extract];
        shuffled.sort();
        assert_eq!(shuffled, Stage::ALL.to_vec());
    }
}
