//! Authoritative chunk store trait.
//!
//! The [`ChunkStore`] is the source of truth for the retrieval core. Both
//! in-memory indices are derived from it: the vector index from the stored
//! embeddings, the keyword index from the stored chunk text.

use crate::search::types::{ChunkId, ChunkRecord, DocumentId, DocumentRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

/// Errors that can occur during chunk store operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    /// Key not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Database error (redb)
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Persistent store for chunks, their embeddings and their documents.
///
/// # Design Notes
///
/// - Each operation is self-contained; no transactions are exposed.
/// - `list_chunks` and `iter_embeddings` return entries in ascending id
///   order, which is also ingestion order.
/// - Implementations must be `Send + Sync`; the engine shares one store
///   between concurrent ingestion and query tasks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    // =========================================================================
    // Chunk Operations
    // =========================================================================

    /// Stores a chunk under its own id, overwriting any existing record.
    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError>;

    /// Returns `Ok(None)` if the chunk doesn't exist.
    async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>, StoreError>;

    /// Retrieves multiple chunks in input order. Missing ids are skipped.
    async fn get_chunks_batch(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError>;

    /// Returns every chunk, ordered by id.
    ///
    /// Used to rebuild the keyword index.
    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError>;

    async fn chunk_count(&self) -> Result<usize, StoreError>;

    // =========================================================================
    // Embedding Operations
    // =========================================================================

    /// Stores the embedding for a chunk, overwriting any existing one.
    async fn put_embedding(&self, id: ChunkId, embedding: &[f32]) -> Result<(), StoreError>;

    async fn get_embedding(&self, id: ChunkId) -> Result<Option<Vec<f32>>, StoreError>;

    /// Returns all embeddings as (ChunkId, embedding) pairs, ordered by id.
    ///
    /// Used to rebuild the vector index on load.
    async fn iter_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError>;

    // =========================================================================
    // Document Operations
    // =========================================================================

    async fn put_document(&self, doc: &DocumentRecord) -> Result<(), StoreError>;

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError>;

    /// Returns all document ids, ascending.
    async fn iter_document_ids(&self) -> Result<Vec<DocumentId>, StoreError>;
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::IoError("Lock poisoned".to_string())
}

/// In-memory chunk store for tests and ephemeral collections.
#[derive(Default)]
pub struct InMemoryChunkStore {
    chunks: RwLock<BTreeMap<ChunkId, ChunkRecord>>,
    embeddings: RwLock<BTreeMap<ChunkId, Vec<f32>>>,
    documents: RwLock<BTreeMap<DocumentId, DocumentRecord>>,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        self.chunks
            .write()
            .map_err(poisoned)?
            .insert(chunk.id, chunk.clone());
        Ok(())
    }

    async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        Ok(self.chunks.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn get_chunks_batch(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        let chunks = self.chunks.read().map_err(poisoned)?;
        Ok(ids.iter().filter_map(|id| chunks.get(id).cloned()).collect())
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        Ok(self.chunks.read().map_err(poisoned)?.values().cloned().collect())
    }

    async fn chunk_count(&self) -> Result<usize, StoreError> {
        Ok(self.chunks.read().map_err(poisoned)?.len())
    }

    async fn put_embedding(&self, id: ChunkId, embedding: &[f32]) -> Result<(), StoreError> {
        self.embeddings
            .write()
            .map_err(poisoned)?
            .insert(id, embedding.to_vec());
        Ok(())
    }

    async fn get_embedding(&self, id: ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self.embeddings.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn iter_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        Ok(self
            .embeddings
            .read()
            .map_err(poisoned)?
            .iter()
            .map(|(id, emb)| (*id, emb.clone()))
            .collect())
    }

    async fn put_document(&self, doc: &DocumentRecord) -> Result<(), StoreError> {
        self.documents
            .write()
            .map_err(poisoned)?
            .insert(doc.id, doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.documents.read().map_err(poisoned)?.get(&id).cloned())
    }

    async fn iter_document_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        Ok(self.documents.read().map_err(poisoned)?.keys().copied().collect())
    }
}
