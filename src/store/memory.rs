//! In-memory blob store for tests
//!
//! Clones share the same contents and counters, so a test can hand one
//! clone to a [`crate::DatasetIndex`] and inspect the other afterwards.

use crate::store::{BlobReader, BlobStore};
use crate::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    blobs: HashMap<String, Bytes>,
    puts: usize,
    gets: usize,
}

/// A blob store held entirely in memory, counting every call
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without counting it as a `put`
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        self.inner.lock().blobs.insert(key.into(), data.into());
    }

    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().blobs.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().blobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `put` calls, successful or not
    pub fn put_calls(&self) -> usize {
        self.inner.lock().puts
    }

    /// Number of `get` calls, hits and misses
    pub fn get_calls(&self) -> usize {
        self.inner.lock().gets
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, mut content: BlobReader) -> Result<()> {
        self.inner.lock().puts += 1;
        // read outside the lock; only publish a complete value
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        self.inner
            .lock()
            .blobs
            .insert(key.to_string(), Bytes::from(data));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<BlobReader> {
        let mut inner = self.inner.lock();
        inner.gets += 1;
        let data = inner
            .blobs
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }
}
