use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
    /// Coordinator address (default 127.0.0.1:50051)
    #[clap(short = 'J', long)]
    pub host: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Displays the job's phase and how many map and reduce tasks are
    /// unstarted, in flight, or done.
    Status {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
}
