//! Indexing pipeline orchestration.
//!
//! Builds the vector index for a knowledge base once:
//!
//! ```text
//! marker? ──yes──▶ AlreadyIndexed
//!    │no
//!    ▼
//! fetch ──▶ split_json ──▶ reset collection ──▶ embed + add (batched) ──▶ write marker
//! ```
//!
//! The marker file is written only after every batch has been stored, so
//! a run that fails part-way leaves no marker and the next run starts over.
//! Starting over clears the collection first, which removes rows left by
//! the failed run.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::chunk::split_json;
use crate::config::ChunkingConfig;
use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::loader::DocumentLoader;
use crate::models::EmbeddedChunk;
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    AlreadyIndexed,
    Indexed { chunks: usize },
}

/// Contents of the marker file. Only its presence is load-bearing.
#[derive(Debug, Serialize, Deserialize)]
struct IndexMarker {
    source: String,
    chunks: usize,
    embedding_model: String,
    indexed_at: String,
}

pub struct IndexingPipeline {
    loader: Arc<dyn DocumentLoader>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunking: ChunkingConfig,
    batch_size: usize,
    marker_path: PathBuf,
    progress: Box<dyn IndexProgressReporter>,
}

impl IndexingPipeline {
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chunking: ChunkingConfig,
        batch_size: usize,
        marker_path: PathBuf,
    ) -> Self {
        Self {
            loader,
            embedder,
            index,
            chunking,
            batch_size: batch_size.max(1),
            marker_path,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IndexProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub async fn is_indexed(&self) -> Result<bool> {
        Ok(tokio::fs::try_exists(&self.marker_path).await?)
    }

    /// Forget a previous run so the next `ensure_indexed` rebuilds.
    pub async fn remove_marker(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.marker_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to remove {}", self.marker_path.display())
            }),
        }
    }

    /// Index `source` unless the marker says it is already done.
    pub async fn ensure_indexed(&self, source: &str) -> Result<IndexOutcome> {
        if self.is_indexed().await? {
            tracing::debug!(marker = %self.marker_path.display(), "index marker present");
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        self.progress.report(IndexProgressEvent::Fetching {
            source: source.to_string(),
        });
        let document = self
            .loader
            .fetch(source)
            .await
            .with_context(|| format!("Failed to load knowledge base from {}", source))?;

        let chunks = split_json(&document, source, &self.chunking);
        let total = chunks.len();
        self.progress.report(IndexProgressEvent::Chunked {
            chunks: total as u64,
        });
        if total == 0 {
            tracing::warn!(source, "knowledge base produced no chunks");
        }

        self.index.reset().await?;

        let mut stored = 0usize;
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            if vectors.len() != batch.len() {
                bail!(
                    "Embedding provider returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                );
            }

            let embedded: Vec<EmbeddedChunk> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
                .collect();
            self.index.add(&embedded).await?;

            stored += batch.len();
            self.progress.report(IndexProgressEvent::Embedding {
                n: stored as u64,
                total: total as u64,
            });
        }

        self.write_marker(source, stored).await?;
        tracing::info!(source, chunks = stored, "knowledge base indexed");

        Ok(IndexOutcome::Indexed { chunks: stored })
    }

    async fn write_marker(&self, source: &str, chunks: usize) -> Result<()> {
        if let Some(parent) = self.marker_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let marker = IndexMarker {
            source: source.to_string(),
            chunks,
            embedding_model: self.embedder.model_name().to_string(),
            indexed_at: chrono::Utc::now().to_rfc3339(),
        };
        let body = serde_json::to_string_pretty(&marker)?;
        tokio::fs::write(&self.marker_path, body)
            .await
            .with_context(|| format!("Failed to write {}", self.marker_path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryVectorIndex;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StaticLoader {
        value: Value,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentLoader for StaticLoader {
        async fn fetch(&self, _source: &str) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.value.clone())
        }
    }

    /// Embeds text length; can be told to fail on the n-th call.
    struct LengthEmbedder {
        calls: AtomicUsize,
        fail_on_call: Option<usize>,
    }

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(call) == self.fail_on_call {
                bail!("embedding service down");
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<IndexProgressEvent>>,
    }

    impl IndexProgressReporter for Arc<Recording> {
        fn report(&self, event: IndexProgressEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn knowledge_base() -> Value {
        let docs: Vec<Value> = (0..12)
            .map(|i| {
                json!({
                    "title": format!("Doc {}", i),
                    "url": format!("/d/{}", i),
                    "body": "text ".repeat(30),
                })
            })
            .collect();
        json!({ "docs": docs })
    }

    struct Fixture {
        _tmp: TempDir,
        loader: Arc<StaticLoader>,
        embedder: Arc<LengthEmbedder>,
        index: Arc<InMemoryVectorIndex>,
        pipeline: IndexingPipeline,
    }

    fn fixture(fail_on_call: Option<usize>) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let loader = Arc::new(StaticLoader {
            value: knowledge_base(),
            calls: AtomicUsize::new(0),
        });
        let embedder = Arc::new(LengthEmbedder {
            calls: AtomicUsize::new(0),
            fail_on_call,
        });
        let index = Arc::new(InMemoryVectorIndex::new(embedder.clone()));
        let pipeline = IndexingPipeline::new(
            loader.clone(),
            embedder.clone(),
            index.clone(),
            ChunkingConfig::default(),
            4,
            tmp.path().join("idx/lowe_collection.indexed"),
        );
        Fixture {
            _tmp: tmp,
            loader,
            embedder,
            index,
            pipeline,
        }
    }

    #[tokio::test]
    async fn first_run_indexes_and_writes_marker() {
        let f = fixture(None);
        let outcome = f.pipeline.ensure_indexed("kb.json").await.unwrap();

        let IndexOutcome::Indexed { chunks } = outcome else {
            panic!("expected a fresh index, got {:?}", outcome);
        };
        assert!(chunks > 1);
        assert_eq!(f.index.count().await.unwrap(), chunks);
        assert!(f.pipeline.is_indexed().await.unwrap());

        let marker: IndexMarker =
            serde_json::from_str(&std::fs::read_to_string(f.pipeline.marker_path()).unwrap())
                .unwrap();
        assert_eq!(marker.chunks, chunks);
        assert_eq!(marker.embedding_model, "length");
    }

    #[tokio::test]
    async fn second_run_touches_nothing() {
        let f = fixture(None);
        f.pipeline.ensure_indexed("kb.json").await.unwrap();
        let loads = f.loader.calls.load(Ordering::SeqCst);
        let embeds = f.embedder.calls.load(Ordering::SeqCst);
        let stored = f.index.count().await.unwrap();

        let outcome = f.pipeline.ensure_indexed("kb.json").await.unwrap();
        assert_eq!(outcome, IndexOutcome::AlreadyIndexed);
        assert_eq!(f.loader.calls.load(Ordering::SeqCst), loads);
        assert_eq!(f.embedder.calls.load(Ordering::SeqCst), embeds);
        assert_eq!(f.index.count().await.unwrap(), stored);
    }

    #[tokio::test]
    async fn failed_run_leaves_no_marker_and_rerun_does_not_duplicate() {
        let f = fixture(Some(2));
        assert!(f.pipeline.ensure_indexed("kb.json").await.is_err());
        assert!(!f.pipeline.is_indexed().await.unwrap());
        let partial = f.index.count().await.unwrap();
        assert_eq!(partial, 4);

        let outcome = f.pipeline.ensure_indexed("kb.json").await.unwrap();
        let IndexOutcome::Indexed { chunks } = outcome else {
            panic!("expected a rebuild");
        };
        assert_eq!(f.index.count().await.unwrap(), chunks);
        assert!(f.pipeline.is_indexed().await.unwrap());
    }

    #[tokio::test]
    async fn remove_marker_forces_rebuild() {
        let f = fixture(None);
        f.pipeline.ensure_indexed("kb.json").await.unwrap();
        f.pipeline.remove_marker().await.unwrap();
        f.pipeline.remove_marker().await.unwrap();

        assert!(matches!(
            f.pipeline.ensure_indexed("kb.json").await.unwrap(),
            IndexOutcome::Indexed { .. }
        ));
        assert_eq!(f.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn progress_is_reported_in_order() {
        let recording = Arc::new(Recording::default());
        let f = fixture(None);
        let pipeline = f.pipeline.with_progress(Box::new(recording.clone()));
        pipeline.ensure_indexed("kb.json").await.unwrap();

        let events = recording.events.lock().unwrap();
        assert_eq!(
            events[0],
            IndexProgressEvent::Fetching {
                source: "kb.json".to_string()
            }
        );
        assert!(matches!(events[1], IndexProgressEvent::Chunked { .. }));
        let Some(IndexProgressEvent::Embedding { n, total }) = events.last().cloned() else {
            panic!("missing embedding progress");
        };
        assert_eq!(n, total);
    }
}
