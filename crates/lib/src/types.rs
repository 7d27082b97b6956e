//! # Shared Data Types
//!
//! The records that flow between intake stages and into the document store.

use serde::{Deserialize, Deserializer, Serialize};

/// The CTFtime identifier of a single write-up task.
pub type WriteupId = u64;

pub const UNKNOWN_EVENT: &str = "Unknown Event";
pub const UNKNOWN_TASK: &str = "Unknown Task";

/// Task metadata as stored in the run manifest and in `{id}.meta.json`.
///
/// Raw embedded HTML is deliberately not part of this type; it travels
/// separately on [`ScrapedItem`] and is written to its own file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    #[serde(deserialize_with = "lenient_id")]
    pub ctftime_id: WriteupId,
    pub event_name: String,
    pub task_name: String,
    #[serde(default)]
    pub original_url: Option<String>,
}

/// A write-up discovered by the scraper, before grouping.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedItem {
    pub task: TaskInfo,
    /// The CTFtime summary page the item was discovered on.
    pub summary_url: String,
    pub embedded_html: Option<String>,
    pub tags: Vec<String>,
    pub rating: Option<f64>,
}

impl ScrapedItem {
    /// The URL the item is grouped under: the external write-up when there is one,
    /// otherwise the CTFtime summary page.
    pub fn source_url(&self) -> &str {
        self.task
            .original_url
            .as_deref()
            .unwrap_or(self.summary_url.as_str())
    }
}

/// The final per-item record produced by the AI stage and upserted by the storage stage.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WriteupRecord {
    #[serde(deserialize_with = "lenient_id")]
    pub ctftime_id: WriteupId,
    #[serde(default)]
    pub original_writeup_url: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub task_name: String,
    #[serde(default)]
    pub ai_tags: Vec<String>,
    #[serde(default)]
    pub rag_summary: String,
    #[serde(default)]
    pub rewritten_full_text: String,
    #[serde(default)]
    pub full_text: String,
}

/// Accepts an id written either as a JSON number or as a numeric string.
pub fn lenient_id<'de, D>(deserializer: D) -> Result<WriteupId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(WriteupId),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid ctftime_id '{text}'"))),
    }
}

/// Parses an id from a loosely-typed JSON value, as found in batch result lines.
pub fn id_from_value(value: &serde_json::Value) -> Option<WriteupId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_accepts_string_and_numeric_ids() {
        let a: WriteupRecord = serde_json::from_value(json!({"ctftime_id": 12})).unwrap();
        let b: WriteupRecord = serde_json::from_value(json!({"ctftime_id": "12"})).unwrap();
        assert_eq!(a.ctftime_id, 12);
        assert_eq!(a, b);
        assert!(a.ai_tags.is_empty());
    }

    #[test]
    fn source_url_prefers_original_writeup() {
        let mut item = ScrapedItem {
            task: TaskInfo {
                ctftime_id: 1,
                event_name: "E".into(),
                task_name: "T".into(),
                original_url: Some("https://blog.example/post".into()),
            },
            summary_url: "https://ctftime.org/writeup/1".into(),
            embedded_html: None,
            tags: vec![],
            rating: None,
        };
        assert_eq!(item.source_url(), "https://blog.example/post");
        item.task.original_url = None;
        assert_eq!(item.source_url(), "https://ctftime.org/writeup/1");
    }
}
