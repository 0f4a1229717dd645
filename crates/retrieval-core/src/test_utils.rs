//! Test utilities for retrieval-core.
//!
//! Deterministic stand-ins for the external model capabilities and a chunk
//! store with injectable write failures. Only compiled when running tests.

use crate::embedding::EmbeddingProvider;
use crate::error::{EmbeddingError, RerankError};
use crate::search::keyword::tokenize;
use crate::search::rerank::CrossEncoderProvider;
use crate::search::types::{ChunkId, ChunkRecord, DocumentId, DocumentRecord};
use crate::storage::{ChunkStore, InMemoryChunkStore, StoreError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// FNV-1a, so bucket assignment is stable across runs.
fn fnv1a(term: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in term.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Bag-of-words embedder: each token increments one hashed dimension.
///
/// Texts sharing tokens get a positive cosine similarity; identical token
/// multisets get similarity 1.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        for token in tokenize(text) {
            v[(fnv1a(&token) % self.dimension as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.vector(text))
    }
}

/// Embedder that always fails.
pub struct FailingEmbedder {
    dimension: usize,
}

impl FailingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("model not loaded".to_string()))
    }
}

/// Embedder that sleeps before answering like [`HashingEmbedder`].
pub struct SlowEmbedder {
    inner: HashingEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    pub fn new(dimension: usize, delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::new(dimension),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    fn dimension(&self) -> usize {
        self.inner.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.vector(text))
    }
}

/// Cross-encoder scoring a passage by how many distinct query tokens it contains.
pub struct OverlapScorer;

#[async_trait]
impl CrossEncoderProvider for OverlapScorer {
    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        Ok(passages
            .iter()
            .map(|passage| {
                let terms: HashSet<String> = tokenize(passage).into_iter().collect();
                query_terms.intersection(&terms).count() as f32
            })
            .collect())
    }
}

/// Cross-encoder that always fails.
pub struct FailingScorer;

#[async_trait]
impl CrossEncoderProvider for FailingScorer {
    async fn score_batch(&self, _query: &str, _passages: &[String]) -> Result<Vec<f32>, RerankError> {
        Err(RerankError::Unavailable("reranker offline".to_string()))
    }
}

/// Cross-encoder that sleeps before scoring like [`OverlapScorer`].
pub struct SlowScorer {
    delay: Duration,
}

impl SlowScorer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl CrossEncoderProvider for SlowScorer {
    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError> {
        tokio::time::sleep(self.delay).await;
        OverlapScorer.score_batch(query, passages).await
    }
}

/// In-memory store whose `put_chunk` starts failing after `limit` successful
/// writes, and whose `chunk_count` can be made to fail on demand.
pub struct FlakyChunkStore {
    inner: InMemoryChunkStore,
    limit: usize,
    writes: AtomicUsize,
    counts_fail: AtomicBool,
}

impl FlakyChunkStore {
    pub fn failing_after(limit: usize) -> Self {
        Self {
            inner: InMemoryChunkStore::new(),
            limit,
            writes: AtomicUsize::new(0),
            counts_fail: AtomicBool::new(false),
        }
    }

    pub fn set_counts_failing(&self, fail: bool) {
        self.counts_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChunkStore for FlakyChunkStore {
    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        if self.writes.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Err(StoreError::IoError("disk full".to_string()));
        }
        self.inner.put_chunk(chunk).await
    }

    async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        self.inner.get_chunk(id).await
    }

    async fn get_chunks_batch(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.get_chunks_batch(ids).await
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.list_chunks().await
    }

    async fn chunk_count(&self) -> Result<usize, StoreError> {
        if self.counts_fail.load(Ordering::SeqCst) {
            return Err(StoreError::IoError("count unavailable".to_string()));
        }
        self.inner.chunk_count().await
    }

    async fn put_embedding(&self, id: ChunkId, embedding: &[f32]) -> Result<(), StoreError> {
        self.inner.put_embedding(id, embedding).await
    }

    async fn get_embedding(&self, id: ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        self.inner.get_embedding(id).await
    }

    async fn iter_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        self.inner.iter_embeddings().await
    }

    async fn put_document(&self, doc: &DocumentRecord) -> Result<(), StoreError> {
        self.inner.put_document(doc).await
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        self.inner.get_document(id).await
    }

    async fn iter_document_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        self.inner.iter_document_ids().await
    }
}

/// In-memory store whose `iter_embeddings` sleeps before answering, leaving
/// a window between the chunk listing and the embedding scan of a reload.
pub struct SlowScanChunkStore {
    inner: InMemoryChunkStore,
    delay: Duration,
}

impl SlowScanChunkStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryChunkStore::new(),
            delay,
        }
    }
}

#[async_trait]
impl ChunkStore for SlowScanChunkStore {
    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        self.inner.put_chunk(chunk).await
    }

    async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        self.inner.get_chunk(id).await
    }

    async fn get_chunks_batch(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.get_chunks_batch(ids).await
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        self.inner.list_chunks().await
    }

    async fn chunk_count(&self) -> Result<usize, StoreError> {
        self.inner.chunk_count().await
    }

    async fn put_embedding(&self, id: ChunkId, embedding: &[f32]) -> Result<(), StoreError> {
        self.inner.put_embedding(id, embedding).await
    }

    async fn get_embedding(&self, id: ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        self.inner.get_embedding(id).await
    }

    async fn iter_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.iter_embeddings().await
    }

    async fn put_document(&self, doc: &DocumentRecord) -> Result<(), StoreError> {
        self.inner.put_document(doc).await
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        self.inner.get_document(id).await
    }

    async fn iter_document_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        self.inner.iter_document_ids().await
    }
}
