//! # Intake Pipeline
//!
//! Stages 1-4: scrape, extract, AI transformation and storage. Every stage reads
//! the state the previous stage left in the run directory and advances it.

pub mod ai;
pub mod extract;
pub mod runner;
pub mod scrape;
pub mod store;
pub mod throttle;
pub mod transform;

pub use ai::{run_transform_stage, TransformReport};
pub use extract::{run_extraction_stage, ContentExtractor, ExtractError, ExtractReport};
pub use runner::{IntakeServices, PipelineRunner, Stage, StageReport};
pub use scrape::{run_scrape_stage, ListingRow, ScrapeReport, SourceError, SummaryDetails, WriteupSource};
pub use store::{run_store_stage, StoreReport};
pub use transform::{BatchTransformStage, TransformItem};
