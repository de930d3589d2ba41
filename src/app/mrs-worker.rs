use std::sync::Arc;

use clap::Parser;
use mrsched::cmd::{self, worker::Args};
use mrsched::storage::LocalStore;
use mrsched::worker::Worker;
use mrsched::workload;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cmd::init_tracing();
    let args = Args::parse();
    let workload = workload::named(&args.workload)?;
    let store = Arc::new(LocalStore::new(&args.dir));

    // Any failure to reach the coordinator ends this process with an error.
    let worker = Worker::connect(args.config(), store, workload).await?;
    let summary = worker.run().await?;
    info!(
        maps = summary.maps_done,
        reduces = summary.reduces_done,
        abandoned = summary.abandoned,
        "worker finished"
    );
    Ok(())
}
