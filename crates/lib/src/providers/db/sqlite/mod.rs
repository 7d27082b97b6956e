use crate::providers::db::{DocumentFilter, DocumentStore, StoreError, UpsertOutcome};
use crate::types::{WriteupId, WriteupRecord};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::{self, Debug};
use tracing::{debug, info};
use turso::{params, Database, Row, Value as TursoValue};

pub mod sql;

/// Opens (or creates) a turso database and enables WAL mode.
///
/// Use `":memory:"` for an isolated in-memory database. Clones of the returned
/// `Database` share the same underlying storage.
pub async fn open_database(db_path: &str) -> Result<Database, StoreError> {
    if let Some(parent) = std::path::Path::new(db_path).parent() {
        if db_path != ":memory:" && !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Connection(e.to_string()))?;
        }
    }
    let db = turso::Builder::new_local(db_path)
        .build()
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    let conn = db
        .connect()
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    // PRAGMA returns a row, so it goes through `query`.
    conn.query("PRAGMA journal_mode=WAL;", ())
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;
    Ok(db)
}

/// The `writeups` table on a turso database.
#[derive(Clone)]
pub struct TursoDocumentStore {
    pub db: Database,
}

impl TursoDocumentStore {
    pub async fn open(db_path: &str) -> Result<Self, StoreError> {
        let db = open_database(db_path).await?;
        Self::from_database(db).await
    }

    /// Wraps an existing database, creating the table when needed.
    pub async fn from_database(db: Database) -> Result<Self, StoreError> {
        let store = Self { db };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub async fn initialize_schema(&self) -> Result<(), StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.execute(sql::CREATE_WRITEUPS_TABLE, ()).await?;
        Ok(())
    }
}

impl Debug for TursoDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TursoDocumentStore").finish_non_exhaustive()
    }
}

fn text_at(row: &Row, idx: usize) -> Result<String, StoreError> {
    Ok(match row.get_value(idx)? {
        TursoValue::Text(s) => s,
        TursoValue::Null => String::new(),
        other => format!("{other:?}"),
    })
}

/// The SQL form of an id. Ids above `i64::MAX` cannot be stored.
fn sql_id(id: WriteupId) -> Result<i64, StoreError> {
    i64::try_from(id).map_err(|_| StoreError::Malformed {
        id,
        reason: "ctftime_id does not fit a signed 64-bit integer".to_string(),
    })
}

fn id_at(row: &Row, idx: usize) -> Result<WriteupId, StoreError> {
    match row.get_value(idx)? {
        TursoValue::Integer(i) => WriteupId::try_from(i)
            .map_err(|_| StoreError::Operation(format!("negative ctftime_id {i}"))),
        other => Err(StoreError::Operation(format!(
            "unexpected ctftime_id value {other:?}"
        ))),
    }
}

fn record_from_row(row: &Row) -> Result<WriteupRecord, StoreError> {
    let ctftime_id = id_at(row, 0)?;
    let raw_tags = text_at(row, 4)?;
    let ai_tags = if raw_tags.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(&raw_tags).map_err(|e| StoreError::Malformed {
            id: ctftime_id,
            reason: format!("ai_tags is not a JSON string array: {e}"),
        })?
    };
    Ok(WriteupRecord {
        ctftime_id,
        original_writeup_url: text_at(row, 1)?,
        event_name: text_at(row, 2)?,
        task_name: text_at(row, 3)?,
        ai_tags,
        rag_summary: text_at(row, 5)?,
        rewritten_full_text: text_at(row, 6)?,
        full_text: text_at(row, 7)?,
    })
}

#[async_trait]
impl DocumentStore for TursoDocumentStore {
    async fn upsert(&self, record: &WriteupRecord) -> Result<UpsertOutcome, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let id = sql_id(record.ctftime_id)?;
        let tags = serde_json::to_string(&record.ai_tags).map_err(|e| StoreError::Malformed {
            id: record.ctftime_id,
            reason: e.to_string(),
        })?;

        let mut stmt = conn.prepare(sql::SELECT_WRITEUP_EXISTS).await?;
        let mut rows = stmt.query(params![id]).await?;
        let exists = rows.next().await?.is_some();

        if exists {
            conn.execute(
                sql::UPDATE_WRITEUP,
                params![
                    record.original_writeup_url.as_str(),
                    record.event_name.as_str(),
                    record.task_name.as_str(),
                    tags,
                    record.rag_summary.as_str(),
                    record.rewritten_full_text.as_str(),
                    record.full_text.as_str(),
                    id
                ],
            )
            .await?;
            debug!("Updated write-up {id}.");
            Ok(UpsertOutcome::Updated)
        } else {
            conn.execute(
                sql::INSERT_WRITEUP,
                params![
                    id,
                    record.original_writeup_url.as_str(),
                    record.event_name.as_str(),
                    record.task_name.as_str(),
                    tags,
                    record.rag_summary.as_str(),
                    record.rewritten_full_text.as_str(),
                    record.full_text.as_str()
                ],
            )
            .await?;
            debug!("Inserted write-up {id}.");
            Ok(UpsertOutcome::Inserted)
        }
    }

    async fn find(&self, filter: &DocumentFilter) -> Result<Vec<WriteupRecord>, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut rows = match filter {
            DocumentFilter::All => conn.query(&sql::select_writeups(None), ()).await?,
            DocumentFilter::Ids(ids) => {
                // Ids that cannot be stored cannot match either.
                let params: Vec<TursoValue> = ids
                    .iter()
                    .filter_map(|id| sql_id(*id).ok())
                    .map(TursoValue::Integer)
                    .collect();
                if params.is_empty() {
                    return Ok(Vec::new());
                }
                conn.query(&sql::select_writeups(Some(params.len())), params)
                    .await?
            }
        };

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(record_from_row(&row)?);
        }
        info!("Fetched {} write-ups from the document store.", records.len());
        Ok(records)
    }

    async fn ids(&self) -> Result<HashSet<WriteupId>, StoreError> {
        let conn = self
            .db
            .connect()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let mut rows = conn.query(sql::SELECT_WRITEUP_IDS, ()).await?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next().await? {
            ids.insert(id_at(&row, 0)?);
        }
        Ok(ids)
    }
}
