use clap::Parser;
use mrsched::cmd::ctl::{Args, Commands};
use mrsched::ledger::{JobSnapshot, TaskCounts};
use mrsched::rpc::RemoteCoordinator;

fn display_counts(label: &str, counts: &TaskCounts) {
    println!(
        "{label}\tunstarted: {}\tin flight: {}\tdone: {}",
        counts.unstarted, counts.in_flight, counts.done
    );
}

fn display_job_status(snapshot: &JobSnapshot) {
    println!("---------- JOB STATUS ----------");
    println!("Phase:\t\t{}", snapshot.phase);
    println!("Partitions:\t{}", snapshot.reduce_count);
    println!("Map dispatches:\t{}", snapshot.map_tasks_issued);
    println!("--------------------------------");
    display_counts("MAP", &snapshot.maps);
    display_counts("REDUCE", &snapshot.reduces);
    println!("--------------------------------");
    if snapshot.complete {
        println!("Job complete");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let host = args.host.unwrap_or_else(|| "127.0.0.1:50051".to_string());

    let mut coordinator = RemoteCoordinator::connect(format!("http://{}", host)).await?;

    match args.command {
        Commands::Status { json } => {
            let snapshot = coordinator.job_status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                display_job_status(&snapshot);
            }
        }
    }

    Ok(())
}
