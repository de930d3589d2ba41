//! A fault-tolerant, two-phase MapReduce task scheduler.
//!
//! A single coordinator splits a batch of input files into map tasks and,
//! once every map output is in place, schedules reduce tasks over the
//! partitioned intermediate data. Workers pull tasks over gRPC, run the
//! user-supplied map and reduce functions, and report back. A worker that
//! goes silent is detected purely by timeout; its task becomes claimable
//! again and duplicate completion reports are absorbed idempotently.

pub mod cmd;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod rpc;
pub mod sequential;
pub mod storage;
pub mod utils;
pub mod worker;
pub mod workload;

pub use error::{Error, Result};

/// Generated protobuf and gRPC types.
pub mod proto {
    tonic::include_proto!("mapreduce");
}

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while creating the iterator.
/// The inner layer accounts for errors that occur during iteration.
///
/// This accomodates both batch (all keys emitted at once) and lazy
/// (keys only emitted when the iterator is consumed) map operations.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// A map function takes a key-value pair and an auxiliary argument.
///
/// The key is the input file name and the value is its content.
/// It returns an iterator that yields new key-value pairs.
pub type MapFn = fn(kv: KeyValue, aux: &str) -> MapOutput;

/// A reduce function takes in a key, an iterator over values for that key,
/// and an auxiliary argument. It returns an [`anyhow::Result`]
/// containing a single output value.
pub type ReduceFn = fn(
    key: &str,
    values: Box<dyn Iterator<Item = String> + '_>,
    aux: &str,
) -> anyhow::Result<String>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the key of this key-value pair.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the value of this key-value pair.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> String {
        self.value
    }
}

/// Hashes an intermediate key: 32-bit FNV-1a, masked to 31 bits. Compute
/// a reduce bucket for a given key by calculating `ihash(key) % n_reduce`.
pub fn ihash(key: &str) -> u32 {
    const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.bytes() {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash & 0x7fff_ffff
}

/// The reduce partition a key belongs to.
#[inline]
pub fn partition_of(key: &str, n_reduce: u32) -> u32 {
    ihash(key) % n_reduce
}
