//! # Step 8: Deploy and Undeploy Indexes

use crate::config::VectorConfig;
use crate::errors::PipelineError;
use crate::vector::index::{VectorIndex, VectorIndexError};
use futures::future::try_join_all;
use std::fmt;
use std::str::FromStr;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployAction {
    Deploy,
    Undeploy,
}

impl FromStr for DeployAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deploy" => Ok(DeployAction::Deploy),
            "undeploy" => Ok(DeployAction::Undeploy),
            other => Err(format!("invalid deploy action '{other}'")),
        }
    }
}

impl fmt::Display for DeployAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeployAction::Deploy => "deploy",
            DeployAction::Undeploy => "undeploy",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSelection {
    Summary,
    Detailed,
    All,
}

impl FromStr for IndexSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "summary" => Ok(IndexSelection::Summary),
            "detailed" => Ok(IndexSelection::Detailed),
            "all" => Ok(IndexSelection::All),
            other => Err(format!("invalid index selection '{other}'")),
        }
    }
}

/// A configured index and the endpoint that serves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTarget {
    pub label: &'static str,
    pub index_name: Option<String>,
    pub endpoint: Option<String>,
}

impl IndexSelection {
    pub fn targets(&self, config: &VectorConfig) -> Vec<IndexTarget> {
        let summary = IndexTarget {
            label: "summary",
            index_name: config.summary_index.clone(),
            endpoint: config.summary_endpoint.clone(),
        };
        let detailed = IndexTarget {
            label: "detailed",
            index_name: config.detailed_index.clone(),
            endpoint: config.detailed_endpoint.clone(),
        };
        match self {
            IndexSelection::Summary => vec![summary],
            IndexSelection::Detailed => vec![detailed],
            IndexSelection::All => vec![summary, detailed],
        }
    }
}

/// What happened to one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployOutcome {
    Deployed(String),
    Undeployed(Vec<String>),
    Skipped,
}

async fn manage(
    index: &dyn VectorIndex,
    action: DeployAction,
    target: &IndexTarget,
) -> Result<DeployOutcome, PipelineError> {
    info!("--- Managing: {} ({action}) ---", target.label);
    let (Some(index_name), Some(endpoint)) = (&target.index_name, &target.endpoint) else {
        error!(
            "Index or endpoint for '{}' is not configured. Skipping.",
            target.label
        );
        return Ok(DeployOutcome::Skipped);
    };

    match action {
        DeployAction::Deploy => Ok(DeployOutcome::Deployed(
            index.deploy(index_name, endpoint).await?,
        )),
        DeployAction::Undeploy => match index.undeploy(index_name, endpoint).await {
            Ok(removed) => Ok(DeployOutcome::Undeployed(removed)),
            Err(VectorIndexError::EndpointNotFound(_)) => {
                warn!("Endpoint '{endpoint}' not found. Cannot undeploy. No action taken.");
                Ok(DeployOutcome::Skipped)
            }
            Err(e) => Err(e.into()),
        },
    }
}

#[instrument(skip(index, config))]
pub async fn run_deploy_step(
    index: &dyn VectorIndex,
    config: &VectorConfig,
    action: DeployAction,
    selection: IndexSelection,
) -> Result<Vec<DeployOutcome>, PipelineError> {
    info!(">>> Starting Step 8: Deploy & Manage Index Endpoints ({action}) <<<");
    let targets = selection.targets(config);
    let outcomes = try_join_all(targets.iter().map(|t| manage(index, action, t))).await?;
    info!(">>> Step 8 finished. <<<");
    Ok(outcomes)
}
