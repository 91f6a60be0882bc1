//! In-memory [`VectorStore`] for tests and embedding into other tools.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Queries are
//! brute-force cosine distance over every record in the collection.
//! Availability can be toggled to simulate an unreachable store, and
//! write/delete calls are counted so callers can assert on rebuilds.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::{check_batch, rank_results, VectorStore};
use crate::embedding::cosine_distance;
use crate::models::{Chunk, SearchResult};

struct Record {
    chunk: Chunk,
    vector: Vec<f32>,
}

pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
    available: AtomicBool,
    pings: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            pings: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Make every operation fail (or succeed again) as if the store went away.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of [`ping`](VectorStore::ping) calls so far.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    /// Number of successful [`write_all`](VectorStore::write_all) calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of [`delete_collection`](VectorStore::delete_collection) calls so far.
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Records currently held in `collection` (0 when absent).
    pub fn len(&self, collection: &str) -> usize {
        self.read()
            .map(|c| c.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.available.load(Ordering::SeqCst) {
            bail!("in-memory store is unavailable");
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<Record>>>> {
        self.collections
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<Record>>>> {
        self.collections
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ping(&self) -> Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.ensure_available()
    }

    async fn probe(&self, collection: &str) -> Result<bool> {
        self.ensure_available()?;
        Ok(self.read()?.get(collection).is_some_and(|r| !r.is_empty()))
    }

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.ensure_available()?;
        let collections = self.read()?;
        let records = match collections.get(collection) {
            Some(records) => records,
            None => return Ok(Vec::new()),
        };

        let results = records
            .iter()
            .map(|r| SearchResult {
                chunk: r.chunk.clone(),
                distance: cosine_distance(query_vec, &r.vector),
            })
            .collect();

        Ok(rank_results(results, k))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.ensure_available()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.write()?.remove(collection) {
            Some(_) => Ok(()),
            None => bail!("collection '{}' does not exist", collection),
        }
    }

    async fn write_all(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        self.ensure_available()?;
        check_batch(chunks, vectors)?;

        let mut collections = self.write()?;
        let records = collections.entry(collection.to_string()).or_default();
        records.extend(chunks.iter().zip(vectors).map(|(chunk, vector)| Record {
            chunk: chunk.clone(),
            vector: vector.clone(),
        }));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
