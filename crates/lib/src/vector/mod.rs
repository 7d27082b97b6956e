//! # Vector Index
//!
//! Steps 5-9: chunk and prepare the stored write-ups, embed them as batch jobs,
//! load the embeddings into the index, deploy the index behind an endpoint and
//! probe it with a test query.

pub mod chunker;
pub mod deploy;
pub mod embed;
pub mod index;
pub mod pipeline;
pub mod populate;
pub mod prepare;
pub mod probe;
pub mod resolver;

pub use chunker::{CharTokenizer, Chunk, ChunkId, Chunker, TiktokenTokenizer, Tokenizer};
pub use deploy::{run_deploy_step, DeployAction, DeployOutcome, IndexSelection};
pub use embed::run_embed_step;
pub use index::{EmbeddingEntry, Neighbor, TursoVectorIndex, VectorIndex, VectorIndexError};
pub use pipeline::{run_vector_pipeline, VectorOptions, VectorServices, VectorStep};
pub use populate::run_populate_step;
pub use prepare::run_prepare_step;
pub use probe::{run_probe_step, ProbeResult};
pub use resolver::{document_id_of, resolve, resolve_neighbors};
