//! Executes one map or reduce task against a [`BlobStore`].
//!
//! These functions are synchronous and know nothing about the coordinator;
//! the worker runs them on the blocking pool, the sequential runner calls
//! them directly.

use std::collections::BTreeMap;

use bytes::BytesMut;
use itertools::Itertools;
use tracing::warn;

use crate::codec;
use crate::error::Result;
use crate::rpc::{MapAssignment, ReduceAssignment};
use crate::storage::BlobStore;
use crate::utils::string_from_bytes;
use crate::{partition_of, KeyValue, Workload};

/// Runs the map function over one input file and writes one intermediate
/// blob per reduce partition, empty ones included. Returns the output
/// prefix the blobs were written under.
///
/// A missing or unreadable input is mapped as empty content.
pub fn perform_map(
    store: &dyn BlobStore,
    workload: &Workload,
    aux: &str,
    task: &MapAssignment,
) -> Result<String> {
    let content = match store.get(&task.file_name) {
        Ok(Some(buf)) => string_from_bytes(&buf),
        Ok(None) => {
            warn!(file = %task.file_name, "input missing, mapping empty content");
            String::new()
        }
        Err(e) => {
            warn!(file = %task.file_name, error = %e, "input unreadable, mapping empty content");
            String::new()
        }
    };

    let input = KeyValue::new(task.file_name.clone(), content);
    let mut pairs = (workload.map_fn)(input, aux)?.collect::<anyhow::Result<Vec<_>>>()?;
    pairs.sort_by(|a, b| a.key.cmp(&b.key));

    let mut buckets = vec![BytesMut::new(); task.reduce_count as usize];
    for (key, group) in &pairs.into_iter().chunk_by(|kv| kv.key.clone()) {
        let values: Vec<String> = group.map(KeyValue::into_value).collect();
        let bucket = &mut buckets[partition_of(&key, task.reduce_count) as usize];
        codec::encode_line(bucket, &key, values.iter().map(String::as_str));
    }

    let prefix = codec::map_output_prefix(task.map_task_id);
    for (partition, bucket) in buckets.into_iter().enumerate() {
        let name = codec::intermediate_name(&prefix, partition as u32);
        store.put(&name, bucket.freeze())?;
    }
    Ok(prefix)
}

/// Gathers partition `P` from every map output, calls the reduce function
/// once per key in lexicographic order, and writes `mr-out-P`. Returns the
/// output file name.
///
/// A missing intermediate blob contributes nothing; a corrupt one fails
/// the task.
pub fn perform_reduce(
    store: &dyn BlobStore,
    workload: &Workload,
    aux: &str,
    task: &ReduceAssignment,
) -> Result<String> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for prefix in &task.map_output_prefixes {
        let name = codec::intermediate_name(prefix, task.partition_index);
        let Some(buf) = store.get(&name)? else {
            warn!(file = %name, "intermediate file missing, skipping");
            continue;
        };
        for (key, values) in codec::decode(&buf)? {
            grouped.entry(key).or_default().extend(values);
        }
    }

    let mut out = BytesMut::new();
    for (key, values) in grouped {
        let value = (workload.reduce_fn)(&key, Box::new(values.into_iter()), aux)?;
        codec::encode_output_line(&mut out, &key, &value);
    }

    let output = codec::output_name(task.partition_index);
    store.put(&output, out.freeze())?;
    Ok(output)
}
