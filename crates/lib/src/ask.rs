//! # Question Answering
//!
//! Embeds a question, finds the closest chunks on the detailed endpoint, pulls
//! the write-ups they came from out of the document store and asks the model to
//! answer from that context only.

use crate::errors::PipelineError;
use crate::prompts::{RAG_ANSWER_SYSTEM_PROMPT, RAG_ANSWER_USER_PROMPT};
use crate::providers::ai::{AiProvider, Embedder};
use crate::providers::db::{DocumentFilter, DocumentStore};
use crate::types::{WriteupId, WriteupRecord};
use crate::vector::index::VectorIndex;
use crate::vector::resolver::resolve_neighbors;
use std::fmt;
use tracing::{debug, error, info, instrument, warn};

pub const NO_CONTEXT_MESSAGE: &str = "Could not retrieve context from the database. Aborting.";
pub const ANSWER_FAILED_MESSAGE: &str = "Sorry, I was unable to generate an answer.";

fn or_na(value: &str) -> &str {
    if value.trim().is_empty() {
        "N/A"
    } else {
        value
    }
}

/// The context block one write-up contributes to the prompt.
pub fn context_block(record: &WriteupRecord) -> String {
    format!(
        "Title: {}\nSource: {}\nSummary: {}\n\nFull Write-up:\n{}\n---\n",
        or_na(&record.task_name),
        or_na(&record.original_writeup_url),
        or_na(&record.rag_summary),
        or_na(&record.rewritten_full_text),
    )
}

/// How a source is cited: its URL, or its title when it has none.
pub fn source_label(record: &WriteupRecord) -> &str {
    if record.original_writeup_url.trim().is_empty() {
        or_na(&record.task_name)
    } else {
        &record.original_writeup_url
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    /// Nothing relevant was found, so the model was never asked.
    NoContext,
    Answered { text: String, sources: Vec<String> },
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Answer::NoContext => writeln!(f, "{NO_CONTEXT_MESSAGE}"),
            Answer::Answered { text, sources } => {
                writeln!(f, "--- Answer ---")?;
                writeln!(f, "{}", text.trim())?;
                writeln!(f, "--- Answer ---")?;
                writeln!(f)?;
                writeln!(f, "Sources:")?;
                for source in sources {
                    writeln!(f, "- {source}")?;
                }
                Ok(())
            }
        }
    }
}

/// Everything one question needs.
#[derive(Debug)]
pub struct QuestionAnswerer<'a> {
    pub embedder: &'a dyn Embedder,
    pub index: &'a dyn VectorIndex,
    pub store: &'a dyn DocumentStore,
    pub ai: &'a dyn AiProvider,
    pub endpoint: &'a str,
    pub neighbors: usize,
}

impl QuestionAnswerer<'_> {
    /// The stored write-ups behind the closest chunks, closest first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<WriteupRecord>, PipelineError> {
        let vector = self.embedder.embed(question).await?;
        let neighbors = self
            .index
            .find_neighbors(self.endpoint, &vector, self.neighbors)
            .await?;
        let document_ids = resolve_neighbors(&neighbors);
        info!(
            "Found {} neighbors from {} documents.",
            neighbors.len(),
            document_ids.len()
        );

        let ids: Vec<WriteupId> = document_ids
            .iter()
            .filter_map(|id| match id.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring non-numeric document id '{id}'.");
                    None
                }
            })
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = self.store.find(&DocumentFilter::Ids(ids.clone())).await?;
        records.sort_by_key(|r| ids.iter().position(|id| *id == r.ctftime_id));
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn ask(&self, question: &str) -> Result<Answer, PipelineError> {
        let records = self.retrieve(question).await?;
        if records.is_empty() {
            warn!("{NO_CONTEXT_MESSAGE}");
            return Ok(Answer::NoContext);
        }

        let context: String = records.iter().map(context_block).collect();
        let user_prompt = RAG_ANSWER_USER_PROMPT
            .replace("{context}", &context)
            .replace("{question}", question);
        debug!("--> Asking with {} chars of context", context.len());

        let text = match self.ai.generate(RAG_ANSWER_SYSTEM_PROMPT, &user_prompt).await {
            Ok(text) => text,
            Err(e) => {
                error!("Answer generation failed: {e}");
                ANSWER_FAILED_MESSAGE.to_string()
            }
        };
        let sources = records.iter().map(|r| source_label(r).to_string()).collect();
        Ok(Answer::Answered { text, sources })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_values_render_as_na() {
        let record = WriteupRecord {
            ctftime_id: 1,
            task_name: "baby-rop".into(),
            ..Default::default()
        };
        let block = context_block(&record);
        assert!(block.starts_with("Title: baby-rop\nSource: N/A\nSummary: N/A\n"));
        assert!(block.ends_with("Full Write-up:\nN/A\n---\n"));
        assert_eq!(source_label(&record), "baby-rop");
    }

    #[test]
    fn answers_cite_their_sources() {
        let answer = Answer::Answered {
            text: "Use a ret2libc.\n".into(),
            sources: vec!["https://a.example/w".into()],
        };
        let rendered = answer.to_string();
        assert!(rendered.starts_with("--- Answer ---\nUse a ret2libc.\n--- Answer ---\n"));
        assert!(rendered.ends_with("Sources:\n- https://a.example/w\n"));
        assert_eq!(Answer::NoContext.to_string().trim(), NO_CONTEXT_MESSAGE);
    }
}
