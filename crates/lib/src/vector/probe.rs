//! # Step 9: Test Endpoints
//!
//! Sends one query through every configured endpoint to check it is live.

use crate::config::VectorConfig;
use crate::errors::PipelineError;
use crate::providers::ai::Embedder;
use crate::vector::index::{Neighbor, VectorIndex};
use tracing::{error, info, instrument, warn};

/// Neighbors returned by one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub endpoint: String,
    pub neighbors: Vec<Neighbor>,
}

#[instrument(skip(embedder, index, config))]
pub async fn run_probe_step(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    config: &VectorConfig,
    query: Option<&str>,
) -> Result<Vec<ProbeResult>, PipelineError> {
    info!(">>> Starting Step 9: Test Index Endpoints <<<");
    let query = query.unwrap_or(&config.default_query);
    let vector = embedder.embed(query).await?;
    info!("Generated embedding for query: '{query}'");

    let endpoints = [
        ("summary", config.summary_endpoint.as_deref()),
        ("detailed", config.detailed_endpoint.as_deref()),
    ];
    let mut results = Vec::new();
    for (label, endpoint) in endpoints {
        info!("--- Testing {label} index ---");
        let Some(endpoint) = endpoint else {
            warn!("No endpoint configured for the {label} index. Skipping.");
            continue;
        };
        let neighbors = index
            .find_neighbors(endpoint, &vector, config.test_neighbors)
            .await
            .inspect_err(|e| error!("Testing endpoint '{endpoint}' failed: {e}"))?;

        if neighbors.is_empty() {
            warn!("  No neighbors found for the query.");
        } else {
            info!("  Found neighbors:");
            for (i, n) in neighbors.iter().enumerate() {
                info!("    {}. ID: {}, Distance: {:.4}", i + 1, n.id, n.distance);
            }
        }
        results.push(ProbeResult {
            endpoint: endpoint.to_string(),
            neighbors,
        });
    }
    info!(">>> Step 9 finished. <<<");
    Ok(results)
}
