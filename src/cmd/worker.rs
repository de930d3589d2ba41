use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::WorkerConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Pull and run map/reduce tasks until the job is done", long_about = None)]
pub struct Args {
    /// Connect to a coordinator at the given IP address and port
    #[clap(short, long)]
    pub join: String,
    /// Name of the workload
    #[clap(short, long, default_value = "wc")]
    pub workload: String,
    /// Directory that input, intermediate and output files live in
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Milliseconds to back off when the coordinator has nothing to hand out
    #[clap(long, default_value_t = 1000)]
    pub wait_ms: u64,
    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}

impl Args {
    pub fn config(&self) -> WorkerConfig {
        WorkerConfig {
            coordinator_addr: self.join.clone(),
            wait_interval: Duration::from_millis(self.wait_ms),
            aux: self.args.join(" "),
        }
    }
}
