//! In-memory blob store

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use crystalys_core::{BlobError, BlobStore};

/// Serves artifacts from a map keyed by URL and records every fetch
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fetched: Mutex<Vec<String>>,
    failure: Mutex<Option<BlobError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `bytes` at `url`
    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        lock(&self.blobs).insert(url.into(), bytes);
    }

    /// Fail every fetch with `error` until cleared with `None`
    pub fn fail_with(&self, error: Option<BlobError>) {
        *lock(&self.failure) = error;
    }

    /// URLs requested so far, in order
    pub fn fetched(&self) -> Vec<String> {
        lock(&self.fetched).clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        lock(&self.fetched).push(url.to_string());

        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }

        lock(&self.blobs).get(url).cloned().ok_or(BlobError::NotFound)
    }
}
