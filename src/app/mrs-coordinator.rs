use clap::Parser;
use mrsched::cmd::{self, coordinator::Args};
use mrsched::coordinator;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cmd::init_tracing();
    let (files, config) = Args::parse().into_job()?;
    info!(inputs = files.len(), addr = %config.listen_addr, "coordinator starting");
    coordinator::run(files, config).await?;
    Ok(())
}
