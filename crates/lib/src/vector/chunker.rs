//! # Chunker
//!
//! Splits a document into overlapping token windows for the detail-level index.
//! Window `i` starts at token `i * (window - overlap)`; the last one may be short.

use crate::config::ChunkingConfig;
use crate::errors::PipelineError;
use std::fmt::{self, Debug};
use std::str::FromStr;
use tiktoken_rs::CoreBPE;
use tracing::warn;

const CHUNK_SEPARATOR: &str = "_chunk_";

pub trait Tokenizer: Send + Sync + Debug {
    fn encode(&self, text: &str) -> Vec<usize>;

    /// `None` when the tokens do not decode to valid text.
    fn decode(&self, tokens: &[usize]) -> Option<String>;
}

/// A BPE tokenizer. Special-token text is encoded as ordinary text.
pub struct TiktokenTokenizer {
    encoding: String,
    bpe: CoreBPE,
}

impl TiktokenTokenizer {
    pub fn for_encoding(encoding: &str) -> Result<Self, PipelineError> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => {
                return Err(PipelineError::Tokenizer(format!(
                    "unsupported encoding '{other}'"
                )))
            }
        }
        .map_err(|e| PipelineError::Tokenizer(e.to_string()))?;
        Ok(Self {
            encoding: encoding.to_string(),
            bpe,
        })
    }
}

impl Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TiktokenTokenizer")
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as usize)
            .collect()
    }

    fn decode(&self, tokens: &[usize]) -> Option<String> {
        self.bpe
            .decode(tokens.iter().map(|&t| t as _).collect())
            .ok()
    }
}

/// One token per character. Handy where exact boundaries matter more than realism.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Vec<usize> {
        text.chars().map(|c| c as usize).collect()
    }

    fn decode(&self, tokens: &[usize]) -> Option<String> {
        tokens
            .iter()
            .map(|&t| u32::try_from(t).ok().and_then(char::from_u32))
            .collect()
    }
}

/// The identity of a chunk: its document and its window index.
///
/// The index key is the `{document_id}_chunk_{chunk_index}` string, but the
/// parts travel separately so nothing downstream needs to split it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub document_id: String,
    pub chunk_index: usize,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{CHUNK_SEPARATOR}{}", self.document_id, self.chunk_index)
    }
}

impl FromStr for ChunkId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (document_id, index) = s
            .rsplit_once(CHUNK_SEPARATOR)
            .ok_or_else(|| format!("'{s}' is not a chunk id"))?;
        let chunk_index = index
            .parse()
            .map_err(|_| format!("'{s}' has a non-numeric chunk index"))?;
        if document_id.is_empty() {
            return Err(format!("'{s}' has no document id"));
        }
        Ok(Self {
            document_id: document_id.to_string(),
            chunk_index,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
}

#[derive(Debug)]
pub struct Chunker {
    tokenizer: Box<dyn Tokenizer>,
    window: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(tokenizer: Box<dyn Tokenizer>, window: usize, overlap: usize) -> Result<Self, PipelineError> {
        if window == 0 || overlap >= window {
            return Err(PipelineError::Tokenizer(format!(
                "chunk overlap ({overlap}) must be smaller than the window ({window})"
            )));
        }
        Ok(Self {
            tokenizer,
            window,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, PipelineError> {
        let tokenizer = TiktokenTokenizer::for_encoding(&config.encoding)?;
        Self::new(Box::new(tokenizer), config.window, config.overlap)
    }

    pub fn stride(&self) -> usize {
        self.window - self.overlap
    }

    /// Token ranges of every window over `token_count` tokens.
    pub fn windows(&self, token_count: usize) -> Vec<std::ops::Range<usize>> {
        (0..token_count)
            .step_by(self.stride())
            .map(|start| start..(start + self.window).min(token_count))
            .collect()
    }

    /// Chunks `text`. Empty text gives no chunks.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let tokens = self.tokenizer.encode(text);
        self.windows(tokens.len())
            .into_iter()
            .enumerate()
            .filter_map(|(chunk_index, range)| {
                let id = ChunkId {
                    document_id: document_id.to_string(),
                    chunk_index,
                };
                match self.tokenizer.decode(&tokens[range]) {
                    Some(content) => Some(Chunk { id, content }),
                    None => {
                        warn!("Could not decode chunk {id}. Skipping.");
                        None
                    }
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_chunker(window: usize, overlap: usize) -> Chunker {
        Chunker::new(Box::new(CharTokenizer), window, overlap).unwrap()
    }

    #[test]
    fn windows_follow_the_stride() {
        let chunker = char_chunker(500, 75);
        assert_eq!(chunker.windows(0), Vec::<std::ops::Range<usize>>::new());
        assert_eq!(chunker.windows(100), vec![0..100]);
        assert_eq!(chunker.windows(500), vec![0..500, 425..500]);
        assert_eq!(chunker.windows(1000), vec![0..500, 425..925, 850..1000]);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let chunker = char_chunker(4, 1);
        let chunks = chunker.chunk("7", "abcdefghij");

        let contents: Vec<_> = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["abcd", "defg", "ghij", "j"]);
        assert_eq!(chunks[2].id.to_string(), "7_chunk_2");
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(char_chunker(4, 1).chunk("1", "").is_empty());
    }

    #[test]
    fn chunk_ids_parse_back() {
        let id: ChunkId = "1234_chunk_12".parse().unwrap();
        assert_eq!(id.document_id, "1234");
        assert_eq!(id.chunk_index, 12);
        assert!("1234".parse::<ChunkId>().is_err());
        assert!("1234_chunk_x".parse::<ChunkId>().is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_window() {
        assert!(Chunker::new(Box::new(CharTokenizer), 10, 10).is_err());
    }

    #[test]
    fn tiktoken_chunks_decode_to_text() {
        let tokenizer = TiktokenTokenizer::for_encoding("cl100k_base").unwrap();
        let chunker = Chunker::new(Box::new(tokenizer), 8, 2).unwrap();
        let text = "The service leaks a format string. <|endoftext|> Use %p to find the canary.";

        let chunks = chunker.chunk("42", text);

        assert!(chunks.len() > 1);
        assert!(chunks[0].content.starts_with("The service"));
        assert!(chunks.iter().any(|c| c.content.contains("<|endoftext|>")));
    }
}
