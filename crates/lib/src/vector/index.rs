//! # Vector Index Service
//!
//! Named indexes of embeddings, deployed to named endpoints that serve
//! nearest-neighbour queries. The turso implementation keeps entries, endpoints
//! and deployments in one database and ranks with `vector_distance_cos`.

use crate::providers::db::sqlite::{open_database, sql};
use async_trait::async_trait;
use chrono::Local;
use dyn_clone::DynClone;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use thiserror::Error;
use tracing::{debug, info, warn};
use turso::{params, Database, Row, Value as TursoValue};

#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Failed to connect to vector index: {0}")]
    Connection(String),
    #[error("Vector index operation failed: {0}")]
    Operation(String),
    #[error("Endpoint '{0}' not found")]
    EndpointNotFound(String),
    #[error("Endpoint '{0}' has no deployed index")]
    NotDeployed(String),
}

impl From<turso::Error> for VectorIndexError {
    fn from(err: turso::Error) -> Self {
        VectorIndexError::Operation(err.to_string())
    }
}

/// One vector to store in an index.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub document_id: Option<String>,
    pub chunk_index: Option<usize>,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub deployed_id: String,
    pub index_name: String,
}

/// Deployed ids of `index_name` all start with this.
pub fn deployed_id_prefix(index_name: &str) -> String {
    format!("deployed_{}_index", index_name.to_lowercase().replace(' ', "_"))
}

#[async_trait]
pub trait VectorIndex: Send + Sync + Debug + DynClone {
    /// Writes `entries` into `index`. With `overwrite` the index is emptied first.
    async fn update_embeddings(
        &self,
        index: &str,
        entries: &[EmbeddingEntry],
        overwrite: bool,
    ) -> Result<usize, VectorIndexError>;

    /// The `k` entries nearest to `query` in the index deployed on `endpoint`,
    /// by ascending distance.
    async fn find_neighbors(
        &self,
        endpoint: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, VectorIndexError>;

    /// Deploys `index` to `endpoint`, creating the endpoint when needed.
    async fn deploy(&self, index: &str, endpoint: &str) -> Result<String, VectorIndexError>;

    /// Removes every deployment of `index` from `endpoint` and deletes the
    /// endpoint once nothing is deployed on it.
    async fn undeploy(&self, index: &str, endpoint: &str) -> Result<Vec<String>, VectorIndexError>;

    async fn deployments(&self, endpoint: &str) -> Result<Vec<Deployment>, VectorIndexError>;
}

dyn_clone::clone_trait_object!(VectorIndex);

#[derive(Clone)]
pub struct TursoVectorIndex {
    pub db: Database,
}

impl Debug for TursoVectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TursoVectorIndex").finish_non_exhaustive()
    }
}

fn embedding_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn vector_literal(vector: &[f32]) -> String {
    format!(
        "vector32('[{}]')",
        vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

fn optional_text(row: &Row, idx: usize) -> Result<Option<String>, VectorIndexError> {
    Ok(match row.get_value(idx)? {
        TursoValue::Text(s) => Some(s),
        _ => None,
    })
}

impl TursoVectorIndex {
    pub async fn open(db_path: &str) -> Result<Self, VectorIndexError> {
        let db = open_database(db_path)
            .await
            .map_err(|e| VectorIndexError::Connection(e.to_string()))?;
        Self::from_database(db).await
    }

    pub async fn from_database(db: Database) -> Result<Self, VectorIndexError> {
        let index = Self { db };
        let conn = index.connect()?;
        conn.execute(sql::CREATE_VECTOR_ENTRIES_TABLE, ()).await?;
        conn.execute(sql::CREATE_INDEX_ENDPOINTS_TABLE, ()).await?;
        conn.execute(sql::CREATE_INDEX_DEPLOYMENTS_TABLE, ()).await?;
        Ok(index)
    }

    fn connect(&self) -> Result<turso::Connection, VectorIndexError> {
        self.db
            .connect()
            .map_err(|e| VectorIndexError::Connection(e.to_string()))
    }

    async fn endpoint_exists(&self, endpoint: &str) -> Result<bool, VectorIndexError> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(sql::SELECT_ENDPOINT, params![endpoint])
            .await?;
        Ok(rows.next().await?.is_some())
    }
}

#[async_trait]
impl VectorIndex for TursoVectorIndex {
    async fn update_embeddings(
        &self,
        index: &str,
        entries: &[EmbeddingEntry],
        overwrite: bool,
    ) -> Result<usize, VectorIndexError> {
        let conn = self.connect()?;
        if overwrite {
            let removed = conn
                .execute(sql::DELETE_INDEX_ENTRIES, params![index])
                .await?;
            debug!("Cleared {removed} entries from index '{index}'.");
        }

        for entry in entries {
            let chunk_index = match entry.chunk_index {
                Some(i) => TursoValue::Integer(i64::try_from(i).map_err(|_| {
                    VectorIndexError::Operation(format!(
                        "chunk index {i} of '{}' is out of range",
                        entry.id
                    ))
                })?),
                None => TursoValue::Null,
            };
            let values: Vec<TursoValue> = vec![
                TursoValue::Text(index.to_string()),
                TursoValue::Text(entry.id.clone()),
                entry
                    .document_id
                    .clone()
                    .map_or(TursoValue::Null, TursoValue::Text),
                chunk_index,
                TursoValue::Blob(embedding_bytes(&entry.embedding)),
            ];
            conn.execute(sql::UPSERT_VECTOR_ENTRY, values).await?;
        }
        info!(
            "Wrote {} embeddings to index '{index}' ({}).",
            entries.len(),
            if overwrite { "overwrite" } else { "append" }
        );
        Ok(entries.len())
    }

    async fn find_neighbors(
        &self,
        endpoint: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, VectorIndexError> {
        if !self.endpoint_exists(endpoint).await? {
            return Err(VectorIndexError::EndpointNotFound(endpoint.to_string()));
        }
        let deployment = self
            .deployments(endpoint)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| VectorIndexError::NotDeployed(endpoint.to_string()))?;
        debug!(
            "Querying '{}' through deployment '{}'.",
            deployment.index_name, deployment.deployed_id
        );

        let conn = self.connect()?;
        let sql = sql::select_neighbors(&vector_literal(query), k);
        let mut rows = conn.query(&sql, params![deployment.index_name]).await?;
        let mut neighbors = Vec::new();
        while let Some(row) = rows.next().await? {
            let id = optional_text(&row, 0)?.unwrap_or_default();
            let chunk_index = match row.get_value(2)? {
                TursoValue::Integer(i) => usize::try_from(i).ok(),
                _ => None,
            };
            let distance = match row.get_value(3)? {
                TursoValue::Real(f) => f,
                TursoValue::Integer(i) => i as f64,
                _ => 0.0,
            };
            neighbors.push(Neighbor {
                id,
                document_id: optional_text(&row, 1)?,
                chunk_index,
                distance,
            });
        }
        Ok(neighbors)
    }

    async fn deploy(&self, index: &str, endpoint: &str) -> Result<String, VectorIndexError> {
        let conn = self.connect()?;
        if self.endpoint_exists(endpoint).await? {
            info!("Found existing endpoint: {endpoint}");
        } else {
            info!("Creating new endpoint: {endpoint}");
            conn.execute(sql::INSERT_ENDPOINT, params![endpoint]).await?;
        }

        let deployed_id = format!(
            "{}_{}",
            deployed_id_prefix(index),
            Local::now().format("%Y%m%d%H%M%S")
        );
        conn.execute(
            sql::INSERT_DEPLOYMENT,
            params![endpoint, deployed_id.as_str(), index],
        )
        .await?;
        info!("Deployed '{index}' to endpoint '{endpoint}' as '{deployed_id}'.");
        Ok(deployed_id)
    }

    async fn undeploy(&self, index: &str, endpoint: &str) -> Result<Vec<String>, VectorIndexError> {
        if !self.endpoint_exists(endpoint).await? {
            return Err(VectorIndexError::EndpointNotFound(endpoint.to_string()));
        }
        let prefix = deployed_id_prefix(index);
        let targets: Vec<String> = self
            .deployments(endpoint)
            .await?
            .into_iter()
            .map(|d| d.deployed_id)
            .filter(|id| id.starts_with(&prefix))
            .collect();
        if targets.is_empty() {
            info!("No deployments matching '{prefix}*' found on endpoint '{endpoint}'.");
        }

        let conn = self.connect()?;
        for deployed_id in &targets {
            conn.execute(
                sql::DELETE_DEPLOYMENT,
                params![endpoint, deployed_id.as_str()],
            )
            .await?;
            info!("Undeployed '{deployed_id}' from endpoint '{endpoint}'.");
        }

        if self.deployments(endpoint).await?.is_empty() {
            conn.execute(sql::DELETE_ENDPOINT, params![endpoint]).await?;
            info!("Endpoint '{endpoint}' is now empty and was deleted.");
        } else {
            warn!("Endpoint '{endpoint}' still has other deployed indexes. It will not be deleted.");
        }
        Ok(targets)
    }

    async fn deployments(&self, endpoint: &str) -> Result<Vec<Deployment>, VectorIndexError> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(sql::SELECT_DEPLOYMENTS, params![endpoint])
            .await?;
        let mut deployments = Vec::new();
        while let Some(row) = rows.next().await? {
            deployments.push(Deployment {
                deployed_id: optional_text(&row, 0)?.unwrap_or_default(),
                index_name: optional_text(&row, 1)?.unwrap_or_default(),
            });
        }
        Ok(deployments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployed_ids_are_namespaced_by_index() {
        assert_eq!(deployed_id_prefix("summary"), "deployed_summary_index");
        assert_eq!(deployed_id_prefix("Detailed Index"), "deployed_detailed_index_index");
    }

    #[test]
    fn vectors_are_little_endian_f32() {
        assert_eq!(embedding_bytes(&[1.0]), 1.0f32.to_le_bytes().to_vec());
        assert_eq!(vector_literal(&[0.5, 1.0]), "vector32('[0.5, 1]')");
    }
}
