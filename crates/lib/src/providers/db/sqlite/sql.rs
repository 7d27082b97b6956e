//! # SQL for the turso-backed stores
//!
//! Keeps the table layout and statements in one place.

pub const CREATE_WRITEUPS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS writeups (
        ctftime_id INTEGER PRIMARY KEY,
        original_writeup_url TEXT NOT NULL DEFAULT '',
        event_name TEXT NOT NULL DEFAULT '',
        task_name TEXT NOT NULL DEFAULT '',
        ai_tags TEXT NOT NULL DEFAULT '[]',
        rag_summary TEXT NOT NULL DEFAULT '',
        rewritten_full_text TEXT NOT NULL DEFAULT '',
        full_text TEXT NOT NULL DEFAULT '',
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
";

pub const CREATE_VECTOR_ENTRIES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS vector_entries (
        index_name TEXT NOT NULL,
        id TEXT NOT NULL,
        document_id TEXT,
        chunk_index INTEGER,
        embedding BLOB NOT NULL,
        PRIMARY KEY (index_name, id)
    );
";

pub const CREATE_INDEX_DEPLOYMENTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS index_deployments (
        endpoint TEXT NOT NULL,
        deployed_id TEXT NOT NULL,
        index_name TEXT NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (endpoint, deployed_id)
    );
";

pub const CREATE_INDEX_ENDPOINTS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS index_endpoints (
        name TEXT PRIMARY KEY,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP
    );
";

/// Every table either store creates.
pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    CREATE_WRITEUPS_TABLE,
    CREATE_VECTOR_ENTRIES_TABLE,
    CREATE_INDEX_ENDPOINTS_TABLE,
    CREATE_INDEX_DEPLOYMENTS_TABLE,
];

pub const WRITEUP_COLUMNS: &str = "ctftime_id, original_writeup_url, event_name, task_name, ai_tags, rag_summary, rewritten_full_text, full_text";

pub const SELECT_WRITEUP_EXISTS: &str = "SELECT 1 FROM writeups WHERE ctftime_id = ?";

pub const INSERT_WRITEUP: &str = "
    INSERT INTO writeups (ctftime_id, original_writeup_url, event_name, task_name, ai_tags, rag_summary, rewritten_full_text, full_text)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";

pub const UPDATE_WRITEUP: &str = "
    UPDATE writeups
    SET original_writeup_url = ?, event_name = ?, task_name = ?, ai_tags = ?, rag_summary = ?,
        rewritten_full_text = ?, full_text = ?, updated_at = CURRENT_TIMESTAMP
    WHERE ctftime_id = ?
";

pub const SELECT_WRITEUP_IDS: &str = "SELECT ctftime_id FROM writeups";

/// `SELECT` for every write-up, or for `id_count` specific ids when `Some`.
pub fn select_writeups(id_count: Option<usize>) -> String {
    match id_count {
        None => format!("SELECT {WRITEUP_COLUMNS} FROM writeups ORDER BY ctftime_id"),
        Some(n) => {
            let placeholders = vec!["?"; n].join(", ");
            format!(
                "SELECT {WRITEUP_COLUMNS} FROM writeups WHERE ctftime_id IN ({placeholders}) ORDER BY ctftime_id"
            )
        }
    }
}

// --- Vector index ---

pub const DELETE_INDEX_ENTRIES: &str = "DELETE FROM vector_entries WHERE index_name = ?";

pub const UPSERT_VECTOR_ENTRY: &str = "
    INSERT OR REPLACE INTO vector_entries (index_name, id, document_id, chunk_index, embedding)
    VALUES (?, ?, ?, ?, ?)
";

/// Nearest entries of one index. `vector` is a `vector32(...)` literal.
pub fn select_neighbors(vector: &str, limit: usize) -> String {
    format!(
        "SELECT id, document_id, chunk_index, vector_distance_cos(embedding, {vector}) AS distance
         FROM vector_entries
         WHERE index_name = ?
         ORDER BY distance ASC
         LIMIT {limit}"
    )
}

pub const SELECT_ENDPOINT: &str = "SELECT name FROM index_endpoints WHERE name = ?";

pub const INSERT_ENDPOINT: &str = "INSERT INTO index_endpoints (name) VALUES (?)";

pub const DELETE_ENDPOINT: &str = "DELETE FROM index_endpoints WHERE name = ?";

pub const INSERT_DEPLOYMENT: &str = "
    INSERT OR REPLACE INTO index_deployments (endpoint, deployed_id, index_name)
    VALUES (?, ?, ?)
";

pub const DELETE_DEPLOYMENT: &str =
    "DELETE FROM index_deployments WHERE endpoint = ? AND deployed_id = ?";

/// Newest deployment first.
pub const SELECT_DEPLOYMENTS: &str = "
    SELECT deployed_id, index_name FROM index_deployments
    WHERE endpoint = ?
    ORDER BY created_at DESC, deployed_id DESC
";
