//! A MapReduce-compatible implementation of word count.
//!

use crate::*;
use anyhow::Result;

pub fn map(kv: KeyValue, _aux: &str) -> MapOutput {
    let words = kv
        .value
        .split(|c: char| !c.is_alphabetic())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();

    let iter = words
        .into_iter()
        .map(|word| Ok::<_, anyhow::Error>(KeyValue::new(word, "1")));
    Ok(Box::new(iter))
}

pub fn reduce(_key: &str, values: Box<dyn Iterator<Item = String> + '_>, _aux: &str) -> Result<String> {
    Ok(values.count().to_string())
}
