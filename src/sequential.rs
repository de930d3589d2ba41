//! Runs a whole job in one process, without a coordinator.
//!
//! The same map and reduce code as the distributed workers runs here, in
//! order, so the output files are identical. Handy as a reference when
//! checking a distributed run.

use itertools::Itertools;
use tracing::info;

use crate::engine::{perform_map, perform_reduce};
use crate::error::{Error, Result};
use crate::rpc::{MapAssignment, ReduceAssignment};
use crate::storage::BlobStore;
use crate::Workload;

/// Maps every distinct input in order, then reduces every partition.
/// Returns the output file names, one per partition.
pub fn run<S: AsRef<str>>(
    inputs: &[S],
    store: &dyn BlobStore,
    workload: &Workload,
    aux: &str,
    reduce_count: u32,
) -> Result<Vec<String>> {
    if reduce_count == 0 {
        return Err(Error::Config("reduce count must be at least 1".into()));
    }

    let mut prefixes = Vec::new();
    for (map_task_id, file) in inputs.iter().map(|s| -> &str { s.as_ref() }).unique().enumerate() {
        let task = MapAssignment {
            file_name: file.to_string(),
            map_task_id: map_task_id as u64,
            reduce_count,
        };
        prefixes.push(perform_map(store, workload, aux, &task)?);
    }
    info!(map_tasks = prefixes.len(), "map phase done");

    (0..reduce_count)
        .map(|partition_index| {
            let task = ReduceAssignment {
                partition_index,
                map_output_prefixes: prefixes.clone(),
            };
            perform_reduce(store, workload, aux, &task)
        })
        .collect()
}
