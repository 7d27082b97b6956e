//! # ctfrag-cli
//!
//! Argument parsing and wiring for the `ctfrag` binary: `intake` runs the
//! scrape, extract, transform and store stages, `vector-index` runs steps 5-9
//! and `ask` answers a question from the deployed detailed index.

pub mod logging;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use ctfrag::ask::QuestionAnswerer;
use ctfrag::batch::{BatchService, VertexBatchService};
use ctfrag::intake::{IntakeServices, PipelineRunner, Stage};
use ctfrag::providers::ai::gemini::{GeminiProvider, GenerationConfig};
use ctfrag::providers::ai::{Embedder, EmbeddingClient};
use ctfrag::providers::db::{DocumentStore, TursoDocumentStore};
use ctfrag::run_dir::RunDir;
use ctfrag::vector::{
    run_vector_pipeline, Chunker, DeployAction, IndexSelection, TursoVectorIndex, VectorOptions,
    VectorServices,
};
use ctfrag::PipelineConfig;
use ctfrag_web::{CtftimeScraper, ReadableTextExtractor};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn};

// --- CLI Definition ---

#[derive(Parser, Debug)]
#[command(name = "ctfrag", author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// YAML configuration file. Defaults to `ctfrag.yml` when present.
    #[arg(long, global = true, env = "CTFRAG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape, clean, transform and store new write-ups
    Intake(IntakeArgs),
    /// Build, deploy and test the vector indexes (steps 5-9)
    VectorIndex(VectorIndexArgs),
    /// Answer a question from the stored write-ups
    Ask(AskArgs),
}

#[derive(Args, Debug)]
pub struct IntakeArgs {
    #[command(subcommand)]
    pub command: IntakeCommands,
}

#[derive(Subcommand, Debug)]
pub enum IntakeCommands {
    /// Create a new run directory and run every stage in order
    Run,
    /// Run one stage against an existing run directory
    Stage {
        /// scrape, extract, transform or store
        stage: Stage,
        run_dir: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct VectorIndexArgs {
    /// Steps to run, always executed in ascending order.
    #[arg(long, num_args = 1.., default_values_t = [5u8, 6, 7, 8, 9])]
    pub steps: Vec<u8>,

    /// Append to the indexes instead of replacing their contents.
    #[arg(long)]
    pub no_overwrite: bool,

    /// deploy or undeploy
    #[arg(long, default_value = "deploy")]
    pub deploy_action: DeployAction,

    /// summary, detailed or all
    #[arg(long, default_value = "all")]
    pub deploy_index: IndexSelection,

    /// Query used by step 9. Defaults to `vector.default_query`.
    #[arg(long)]
    pub query: Option<String>,
}

impl From<VectorIndexArgs> for VectorOptions {
    fn from(args: VectorIndexArgs) -> Self {
        Self {
            steps: args.steps,
            overwrite: !args.no_overwrite,
            deploy_action: args.deploy_action,
            deploy_index: args.deploy_index,
            query: args.query,
        }
    }
}

#[derive(Args, Debug)]
pub struct AskArgs {
    pub question: String,
}

// --- Service Wiring ---

async fn open_store(config: &PipelineConfig) -> Result<TursoDocumentStore> {
    TursoDocumentStore::open(&config.storage.db_url)
        .await
        .with_context(|| format!("failed to open document store '{}'", config.storage.db_url))
}

/// A batch service when GCP is configured. Stages that need one fail later.
fn optional_batch(config: &PipelineConfig) -> Option<Box<dyn BatchService>> {
    match VertexBatchService::from_config(&config.batch) {
        Ok(service) => Some(Box::new(service)),
        Err(e) => {
            warn!("Batch service unavailable: {e}");
            None
        }
    }
}

fn optional_embedder(config: &PipelineConfig) -> Option<Box<dyn Embedder>> {
    let Some(api_url) = config.embedding_api_url() else {
        warn!("No embedding API configured (embedding.api_url or batch.project_id).");
        return None;
    };
    match EmbeddingClient::new(api_url, &config.embedding.model, config.embedding_api_key()) {
        Ok(client) => Some(Box::new(client)),
        Err(e) => {
            warn!("Embedding client unavailable: {e}");
            None
        }
    }
}

async fn intake_services(config: &PipelineConfig) -> Result<IntakeServices> {
    let store: Option<Box<dyn DocumentStore>> = match open_store(config).await {
        Ok(store) => Some(Box::new(store)),
        Err(e) => {
            warn!("{e:#}");
            None
        }
    };
    Ok(IntakeServices {
        source: Box::new(CtftimeScraper::new(&config.scraper)?),
        extractor: Box::new(ReadableTextExtractor),
        batch: optional_batch(config),
        store,
    })
}

/// Cancels the returned token on Ctrl-C so batch waits stop cleanly.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted. Cancelling outstanding batch job waits.");
            token.cancel();
        }
    });
    cancel
}

// --- Commands ---

async fn run_intake(config: &PipelineConfig, command: IntakeCommands) -> Result<()> {
    let (run, stage) = match command {
        IntakeCommands::Run => {
            let run = RunDir::create_new(&config.paths.runs_dir, Local::now())
                .context("failed to create run directory")?;
            (run, None)
        }
        IntakeCommands::Stage { stage, run_dir } => {
            if !run_dir.is_dir() {
                bail!("run directory '{}' does not exist", run_dir.display());
            }
            (RunDir::new(run_dir), Some(stage))
        }
    };

    let dispatch = logging::dispatch(Some(&run.log_path()))?;
    async {
        let services = intake_services(config).await?;
        let runner = PipelineRunner::new(config, services).with_cancellation(cancel_on_ctrl_c());
        match stage {
            Some(stage) => {
                runner.run_stage(stage, &run).await?;
            }
            None => {
                runner.run_all(&run).await?;
            }
        }
        info!("Run directory: {}", run.root().display());
        Ok::<(), anyhow::Error>(())
    }
    .with_subscriber(dispatch)
    .await
}

async fn run_vector_index(config: &PipelineConfig, args: VectorIndexArgs) -> Result<()> {
    let services = VectorServices {
        store: Box::new(open_store(config).await?),
        batch: optional_batch(config),
        index: Box::new(
            TursoVectorIndex::open(&config.vector.db_url)
                .await
                .with_context(|| format!("failed to open vector index '{}'", config.vector.db_url))?,
        ),
        embedder: optional_embedder(config),
        chunker: Chunker::from_config(&config.chunking)?,
    };
    let options = VectorOptions::from(args);
    run_vector_pipeline(config, &services, &options, &cancel_on_ctrl_c()).await?;
    Ok(())
}

async fn run_ask(config: &PipelineConfig, question: &str) -> Result<()> {
    let Some(endpoint) = config.vector.detailed_endpoint.as_deref() else {
        bail!("vector.detailed_endpoint is not configured");
    };
    let api_key = config
        .answer
        .api_key
        .clone()
        .context("answer.api_key (GEMINI_API_KEY) is required to answer questions")?;
    let ai = GeminiProvider::new(
        config.answer.generate_content_url(),
        api_key,
        GenerationConfig {
            temperature: config.answer.temperature,
            top_p: Some(config.answer.top_p),
        },
    )?;
    let embedder = optional_embedder(config).context("an embedding API is required")?;
    let store = open_store(config).await?;
    let index = TursoVectorIndex::open(&config.vector.db_url).await?;

    let answerer = QuestionAnswerer {
        embedder: embedder.as_ref(),
        index: &index,
        store: &store,
        ai: &ai,
        endpoint,
        neighbors: config.answer.neighbors,
    };
    let answer = answerer.ask(question).await?;
    print!("{answer}");
    Ok(())
}

/// Runs one parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let console = logging::dispatch(None)?;
    let config = {
        let _guard = tracing::dispatcher::set_default(&console);
        PipelineConfig::load(cli.config.as_deref()).context("failed to load configuration")?
    };

    match cli.command {
        Commands::Intake(args) => run_intake(&config, args.command).await,
        Commands::VectorIndex(args) => {
            run_vector_index(&config, args)
                .with_subscriber(console)
                .await
        }
        Commands::Ask(args) => run_ask(&config, &args.question).with_subscriber(console).await,
    }
}
