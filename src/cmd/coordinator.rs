use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use crate::config::{CoordinatorConfig, DEFAULT_PORT, DEFAULT_REDUCE_COUNT};
use crate::utils::expand_inputs;

#[derive(Parser, Debug)]
#[command(version, about = "Serve one MapReduce job to a pool of workers", long_about = None)]
pub struct Args {
    /// Input files (or glob patterns), one map task each
    #[clap(required = true)]
    pub files: Vec<String>,
    /// Number of reduce partitions
    #[clap(short, long, default_value_t = DEFAULT_REDUCE_COUNT)]
    pub reduce_count: u32,
    /// [OPT] Specified port for coordinator to listen to
    #[clap(short = 'P', long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Seconds before a silent task is handed to another worker
    #[clap(short, long, default_value_t = 10)]
    pub timeout: u64,
}

impl Args {
    /// Expands the input patterns and builds the coordinator settings.
    pub fn into_job(self) -> Result<(Vec<String>, CoordinatorConfig)> {
        let files = expand_inputs(&self.files)?;
        let config = CoordinatorConfig {
            reduce_count: self.reduce_count,
            task_timeout: Duration::from_secs(self.timeout),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], self.port)),
            ..Default::default()
        };
        config.validate()?;
        Ok((files, config))
    }
}
