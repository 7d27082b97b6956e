//! # ctfrag: CTF write-up RAG pipeline
//!
//! This is the main entry point for the `ctfrag` command-line interface.

use clap::Parser;
use ctfrag_cli::{run, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("[ctfrag error] {e:#}");
        std::process::exit(1);
    }
}
