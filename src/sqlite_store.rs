//! SQLite-backed [`VectorStore`].
//!
//! Chunks and their embeddings live in one `chunks` table keyed by
//! collection name; embeddings are little-endian `f32` BLOBs. Queries are
//! brute-force cosine distance computed in Rust over every row of the
//! collection, which is fine at the corpus sizes this tool targets.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::db;
use crate::migrate;
use docqa_core::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use docqa_core::models::{Chunk, SearchResult};
use docqa_core::store::{check_batch, rank_results, VectorStore};

pub struct SqliteStore {
    pool: SqlitePool,
    schema: OnceCell<()>,
}

impl SqliteStore {
    /// Create a store for `url` (e.g. `sqlite:data/vectordb.sqlite`).
    /// Nothing is opened until the first operation.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self::from_pool(db::connect_lazy(url)?))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema: OnceCell::new(),
        }
    }

    /// Number of records in `collection`.
    pub async fn count(&self, collection: &str) -> Result<i64> {
        self.ensure_schema().await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema
            .get_or_try_init(|| async { migrate::run_migrations(&self.pool).await })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        self.ensure_schema().await
    }

    async fn probe(&self, collection: &str) -> Result<bool> {
        self.ensure_schema().await?;
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM chunks WHERE collection = ?)")
                .bind(collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn query(
        &self,
        collection: &str,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.ensure_schema().await?;

        // Fetch all vectors and compute cosine distance in Rust
        let rows = sqlx::query(
            r#"
            SELECT source_id, chunk_index, char_offset, text, hash, embedding
            FROM chunks
            WHERE collection = ?
            "#,
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let vector = blob_to_vec(&blob);
            let chunk_index: i64 = row.get("chunk_index");
            let char_offset: i64 = row.get("char_offset");
            results.push(SearchResult {
                chunk: Chunk {
                    source_id: row.get("source_id"),
                    index: chunk_index as usize,
                    offset: char_offset as usize,
                    text: row.get("text"),
                    hash: row.get("hash"),
                },
                distance: cosine_distance(query_vec, &vector),
            });
        }

        debug!(collection, candidates = results.len(), k, "scored collection");
        Ok(rank_results(results, k))
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.ensure_schema().await?;
        let mut tx = self.pool.begin().await?;

        // Chunks reference the collection row, so they go first.
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?;

        let removed = sqlx::query("DELETE FROM collections WHERE name = ?")
            .bind(collection)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if removed == 0 {
            bail!("collection '{}' does not exist", collection);
        }

        tx.commit().await?;
        Ok(())
    }

    async fn write_all(
        &self,
        collection: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        check_batch(chunks, vectors)?;
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (collection, source_id, chunk_index, char_offset, text, hash, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(collection)
            .bind(&chunk.source_id)
            .bind(chunk.index as i64)
            .bind(chunk.offset as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
