//! Similarity retrieval over a persisted collection.
//!
//! The [`Retriever`] embeds the query, asks the [`VectorStore`] for the
//! nearest records and guarantees the result contract: at most `k`
//! results, ascending by distance. Embedding and store failures are
//! logged and reported as "no results" so an interactive session keeps
//! going; only an invalid `k` is an error.

use anyhow::{bail, Result};
use tracing::{debug, warn};

use crate::embedding::Embedder;
use crate::models::SearchResult;
use crate::store::{rank_results, VectorStore};

pub const DEFAULT_K: usize = 3;

pub struct Retriever<S, E> {
    store: S,
    embedder: E,
    collection: String,
}

impl<S: VectorStore, E: Embedder> Retriever<S, E> {
    pub fn new(store: S, embedder: E, collection: impl Into<String>) -> Self {
        Self {
            store,
            embedder,
            collection: collection.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Return up to `k` chunks most similar to `query`, closest first.
    ///
    /// # Errors
    ///
    /// Only when `k == 0`. Any backend failure yields `Ok(vec![])`.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            bail!("k must be a positive integer");
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = match self.embedder.embed_query(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to embed query; returning no results");
                return Ok(Vec::new());
            }
        };

        match self.store.query(&self.collection, &query_vec, k).await {
            Ok(results) => {
                debug!(
                    collection = %self.collection,
                    k,
                    hits = results.len(),
                    "similarity search complete"
                );
                Ok(rank_results(results, k))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    collection = %self.collection,
                    "similarity search failed; returning no results"
                );
                Ok(Vec::new())
            }
        }
    }
}
