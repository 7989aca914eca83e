//! Sleet CLI: feed ingestion worker.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use sleet::{Config, init_tracing, run_pipeline};
use sleet_common::queue::{MemoryDeadLetterStore, MemoryQueue};
use sleet_common::store::MemoryStore;

#[derive(Parser)]
#[command(name = "sleet", about = "Feed ingestion worker", version)]
struct CliArgs {
    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    info!(
        queue = %config.queue.name,
        concurrency = config.worker.concurrency,
        chunk_size = config.worker.chunk_size,
        "Starting sleet worker"
    );

    // Local mode: in-process backends
    let queue = Arc::new(MemoryQueue::new());
    let store = Arc::new(MemoryStore::new());
    let dlq = Arc::new(MemoryDeadLetterStore::new());

    match run_pipeline(config, queue, store, dlq).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Pipeline failed: {e}");
            ExitCode::FAILURE
        }
    }
}
