//! Byte-oriented blob storage keyed by file name.
//!
//! Workers read their inputs and write intermediate and final outputs
//! through a [`BlobStore`]. [`LocalStore`] maps names onto a directory;
//! [`MemoryStore`] keeps everything in memory and is shared by in-process
//! workers in tests and by the sequential runner.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use bytes::Bytes;
use dashmap::DashMap;
use tempfile::NamedTempFile;

use crate::error::{Error, Result};

pub trait BlobStore: Send + Sync {
    /// Reads the blob called `name`. Returns `Ok(None)` if it does not exist.
    fn get(&self, name: &str) -> Result<Option<Bytes>>;

    /// Replaces the blob called `name` with `data`.
    ///
    /// Readers observe either the previous contents or all of `data`,
    /// never a prefix of it.
    fn put(&self, name: &str, data: Bytes) -> Result<()>;
}

/// Blobs stored as files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl BlobStore for LocalStore {
    fn get(&self, name: &str) -> Result<Option<Bytes>> {
        match fs::read(self.path_of(name)) {
            Ok(buf) => Ok(Some(Bytes::from(buf))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(name, e)),
        }
    }

    fn put(&self, name: &str, data: Bytes) -> Result<()> {
        let path = self.path_of(name);
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        // Write next to the target and rename so a crashed attempt never
        // leaves a torn file behind.
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| Error::storage(name, e))?;
        tmp.write_all(&data).map_err(|e| Error::storage(name, e))?;
        tmp.persist(&path)
            .map_err(|e| Error::storage(name, e.error))?;
        Ok(())
    }
}

/// Blobs held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all stored blobs, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.blobs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Bytes>> {
        Ok(self.blobs.get(name).map(|e| e.value().clone()))
    }

    fn put(&self, name: &str, data: Bytes) -> Result<()> {
        self.blobs.insert(name.to_string(), data);
        Ok(())
    }
}
