//! Vector store capability interface.
//!
//! The [`VectorStore`] trait is everything the index synchronizer and the
//! retriever need from a persistent store, so backends can be swapped
//! without touching either. A store is organised into named collections of
//! `(chunk, vector)` records.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::models::{Chunk, SearchResult};

/// Abstract vector store backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ping`](VectorStore::ping) | Store is reachable and ready for use |
/// | [`probe`](VectorStore::probe) | Collection exists and holds at least one record |
/// | [`query`](VectorStore::query) | Nearest neighbours by cosine distance, ascending |
/// | [`delete_collection`](VectorStore::delete_collection) | Drop a collection and its records |
/// | [`write_all`](VectorStore::write_all) | Write chunks and vectors into a collection |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Succeeds once the store accepts requests.
    async fn ping(&self) -> Result<()>;

    /// True when `collection` exists and is non-empty.
    async fn probe(&self, collection: &str) -> Result<bool>;

    /// Return at most `k` records of `collection` closest to `query_vec`,
    /// ordered by ascending distance.
    async fn query(&self, collection: &str, query_vec: &[f32], k: usize)
        -> Result<Vec<SearchResult>>;

    /// Remove `collection`. Errors if it does not exist.
    async fn delete_collection(&self, collection: &str) -> Result<()>;

    /// Store `chunks[i]` with `vectors[i]` in `collection`, creating it if needed.
    async fn write_all(&self, collection: &str, chunks: &[Chunk], vectors: &[Vec<f32>])
        -> Result<()>;
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
    async fn ping(&self) -> Result<()> {
        (**self).ping().await
    }

    async fn probe(&self, collection: &str) -> Result<bool> {
        (**self).probe(collection).await
    }

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        (**self).query(collection, query_vec, k).await
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        (**self).delete_collection(collection).await
    }

    async fn write_all(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        (**self).write_all(collection, chunks, vectors).await
    }
}

/// Reject mismatched chunk/vector batches before anything is written.
pub fn check_batch(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

/// Sort results by ascending distance and keep the first `k`.
pub fn rank_results(mut results: Vec<SearchResult>, k: usize) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(k);
    results
}
