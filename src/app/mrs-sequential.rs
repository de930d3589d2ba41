use anyhow::Result;
use clap::Parser;
use mrsched::cmd::{self, sequential::Args};
use mrsched::storage::LocalStore;
use mrsched::utils::expand_inputs;
use mrsched::{sequential, workload};
use tracing::info;

fn main() -> Result<()> {
    cmd::init_tracing();
    let args = Args::parse();
    let engine = workload::named(&args.workload)?;
    let inputs = expand_inputs(&args.files)?;
    let store = LocalStore::new(&args.dir);

    let outputs = sequential::run(&inputs, &store, &engine, &args.args.join(" "), args.reduce_count)?;
    info!(?outputs, "sequential run finished");
    Ok(())
}
