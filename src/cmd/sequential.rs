use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_REDUCE_COUNT;

#[derive(Parser, Debug)]
#[command(version, about = "Run a MapReduce job in a single process", long_about = None)]
pub struct Args {
    /// Input files (or glob patterns)
    #[clap(required = true)]
    pub files: Vec<String>,
    /// Name of the workload
    #[clap(short, long, default_value = "wc")]
    pub workload: String,
    /// Number of reduce partitions
    #[clap(short, long, default_value_t = DEFAULT_REDUCE_COUNT)]
    pub reduce_count: u32,
    /// Directory that input and output files live in
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
    /// Auxiliary arguments to pass to the MapReduce application.
    #[clap(value_parser, last = true)]
    pub args: Vec<String>,
}
