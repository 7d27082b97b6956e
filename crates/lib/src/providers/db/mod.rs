//! # Document Store
//!
//! The final write-up records live in a `writeups` table keyed by `ctftime_id`.
//! Re-running the storage stage overwrites rather than duplicates.

pub mod sqlite;

use crate::types::{WriteupId, WriteupRecord};
use async_trait::async_trait;
use dyn_clone::DynClone;
use std::collections::HashSet;
use std::fmt::Debug;
use thiserror::Error;

pub use sqlite::TursoDocumentStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to connect to document store: {0}")]
    Connection(String),
    #[error("Document store operation failed: {0}")]
    Operation(String),
    #[error("Stored record {id} is malformed: {reason}")]
    Malformed { id: WriteupId, reason: String },
}

impl From<turso::Error> for StoreError {
    fn from(err: turso::Error) -> Self {
        StoreError::Operation(err.to_string())
    }
}

/// Whether an upsert created a new document or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFilter {
    All,
    Ids(Vec<WriteupId>),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + Debug + DynClone {
    /// Inserts the record, or replaces the one with the same `ctftime_id`.
    async fn upsert(&self, record: &WriteupRecord) -> Result<UpsertOutcome, StoreError>;

    async fn find(&self, filter: &DocumentFilter) -> Result<Vec<WriteupRecord>, StoreError>;

    /// Every `ctftime_id` currently stored.
    async fn ids(&self) -> Result<HashSet<WriteupId>, StoreError>;
}

dyn_clone::clone_trait_object!(DocumentStore);
