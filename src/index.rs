//! Vector index gateway.
//!
//! A [`VectorIndex`] stores embedded chunks for one collection and answers
//! similarity queries over them. The index owns the embedder used for
//! queries, so callers search with plain text.
//!
//! Backends:
//! - [`SqliteVectorIndex`]: rows in `<index_path>/index.sqlite`, tagged
//!   with the collection name. Search is brute-force cosine similarity over
//!   the collection's vectors.
//! - [`InMemoryVectorIndex`]: the same semantics behind a `RwLock`, for
//!   tests and throwaway sessions.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, Embedder};
use crate::models::{ChunkMetadata, DocumentChunk, EmbeddedChunk, ScoredChunk};
use crate::{db, migrate};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drop every chunk in the collection.
    async fn reset(&self) -> Result<()>;

    /// Persist chunks with their vectors. Either all rows land or none.
    async fn add(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Top `k` chunks by cosine similarity to `query`, best first.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;

    /// Number of chunks stored in the collection.
    async fn count(&self) -> Result<usize>;
}

fn rank(mut scored: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

// ============ SQLite ============

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    collection: String,
    embedder: Arc<dyn Embedder>,
}

impl SqliteVectorIndex {
    /// Open the index file, creating it and its schema if needed.
    pub async fn open(
        db_path: &Path,
        collection: &str,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let pool = db::connect(db_path)
            .await
            .with_context(|| format!("Failed to open index at {}", db_path.display()))?;
        migrate::run_migrations(&pool).await?;
        Ok(Self {
            pool,
            collection: collection.to_string(),
            embedder,
        })
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn reset(&self) -> Result<()> {
        sqlx::query("DELETE FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn add(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for embedded in chunks {
            let chunk = &embedded.chunk;
            let metadata_json = serde_json::to_string(&chunk.metadata)?;
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO chunks
                    (id, collection, chunk_index, content, metadata_json, hash, embedding, dims, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&self.collection)
            .bind(chunk.metadata.chunk_index)
            .bind(&chunk.content)
            .bind(&metadata_json)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&embedded.vector))
            .bind(embedded.vector.len() as i64)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query(
            r#"
            SELECT id, content, metadata_json, hash, embedding
            FROM chunks
            WHERE collection = ?
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
                .context("Corrupt chunk metadata in index")?;
            scored.push(ScoredChunk {
                score: cosine_similarity(&query_vec, &blob_to_vec(&blob)) as f64,
                chunk: DocumentChunk {
                    id: row.get("id"),
                    content: row.get("content"),
                    metadata,
                    hash: row.get("hash"),
                },
            });
        }

        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

// ============ In-memory ============

pub struct InMemoryVectorIndex {
    chunks: RwLock<Vec<EmbeddedChunk>>,
    embedder: Arc<dyn Embedder>,
}

impl InMemoryVectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            chunks: RwLock::new(Vec::new()),
            embedder,
        }
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("vector index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn reset(&self) -> Result<()> {
        self.chunks.write().map_err(poisoned)?.clear();
        Ok(())
    }

    async fn add(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut stored = self.chunks.write().map_err(poisoned)?;
        for embedded in chunks {
            stored.retain(|c| c.chunk.id != embedded.chunk.id);
            stored.push(embedded.clone());
        }
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;
        let stored = self.chunks.read().map_err(poisoned)?;
        let scored = stored
            .iter()
            .map(|c| ScoredChunk {
                chunk: c.chunk.clone(),
                score: cosine_similarity(&query_vec, &c.vector) as f64,
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.chunks.read().map_err(poisoned)?.len())
    }
}
