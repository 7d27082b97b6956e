//! # Prompt Templates
//!
//! The batch transformation templates use `$event_name`, `$task_name` and a single
//! `$writeup` marker. The question-answering prompt uses `{context}` and `{question}`.

pub mod tasks;

pub use tasks::{
    KEYWORD_PROMPT, RAG_ANSWER_SYSTEM_PROMPT, RAG_ANSWER_USER_PROMPT, REWRITE_PROMPT,
    SUMMARIZE_PROMPT,
};
