//! Utility functions that may be helpful for implementing
//! and testing MapReduce.
//!

use anyhow::Result;
use bytes::Bytes;
use glob::glob;
use itertools::Itertools;

/// Read an entire [`Bytes`] slice into a [`String`].
///
/// Invalid UTF-8 sequences are replaced rather than rejected, so any input
/// file can be fed to a map function.
pub fn string_from_bytes(buf: &Bytes) -> String {
    String::from_utf8_lossy(buf.as_ref()).into_owned()
}

/// Expands glob patterns into the ordered list of input files.
///
/// A pattern that matches nothing is kept verbatim (it may name a file that
/// the blob store resolves differently). Duplicates are dropped, first
/// occurrence wins.
pub fn expand_inputs<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for pattern in patterns {
        let pattern = pattern.as_ref();
        let mut matched: Vec<String> = glob(pattern)?
            .flatten()
            .filter(|path| path.is_file())
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        if matched.is_empty() {
            files.push(pattern.to_string());
        } else {
            matched.sort();
            files.append(&mut matched);
        }
    }
    Ok(files.into_iter().unique().collect())
}
