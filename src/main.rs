mod dlq;
mod domain;
mod engine;
mod escrow;
mod flow;
mod ingestion;
mod ledger;
mod retry;
mod store;

use std::{env, fs::File, path::Path, sync::Arc};

use crate::dlq::TracingDlq;
use crate::engine::Engine;
use crate::flow::AllJobsOpen;
use crate::ingestion::CsvReader;
use crate::store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logs go to stderr; stdout carries the summary tables
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args();
    let file_path = args
        .nth(1)
        .ok_or("usage: settlement_core <commands.csv>")?;
    let file = File::open(Path::new(&file_path))?;

    let ingestion = CsvReader::new(file)?;
    let store = Arc::new(MemoryStore::new());
    let mut engine = Engine::new(ingestion, store, AllJobsOpen, TracingDlq);

    engine.process().await?;
    engine.flush();

    Ok(())
}
