//! Redb-backed chunk store.
//!
//! Uses [redb](https://github.com/cberner/redb), a pure Rust, ACID-compliant
//! embedded B-tree database.
//!
//! # Tables
//!
//! - `chunks`: ChunkId (u64) -> ChunkRecord (JSON)
//! - `embeddings`: ChunkId (u64) -> `Vec<f32>` (raw bytes, little-endian)
//! - `documents`: DocumentId (u64) -> DocumentRecord (JSON)

use super::{ChunkStore, StoreError};
use crate::search::types::{ChunkId, ChunkRecord, DocumentId, DocumentRecord};
use async_trait::async_trait;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

const CHUNKS_TABLE: U64Table = TableDefinition::new("chunks");
const EMBEDDINGS_TABLE: U64Table = TableDefinition::new("embeddings");
const DOCUMENTS_TABLE: U64Table = TableDefinition::new("documents");

type U64Table = TableDefinition<'static, u64, &'static [u8]>;

fn db_err<E: std::fmt::Display>(context: &'static str) -> impl Fn(E) -> StoreError {
    move |e| StoreError::DatabaseError(format!("{}: {}", context, e))
}

/// Redb-backed chunk store.
///
/// # Example
///
/// ```ignore
/// use retrieval_core::storage::RedbChunkStore;
///
/// let store = RedbChunkStore::open("./data/retrieval.redb")?;
/// store.put_chunk(&chunk).await?;
/// ```
pub struct RedbChunkStore {
    db: Arc<Database>,
}

impl RedbChunkStore {
    /// Opens or creates a redb database at the given path.
    ///
    /// Creates the database file and all tables if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| StoreError::DatabaseError(format!("Failed to open database: {}", e)))?;

        {
            let write_txn = db.begin_write().map_err(db_err("Failed to begin write transaction"))?;
            for table in [CHUNKS_TABLE, EMBEDDINGS_TABLE, DOCUMENTS_TABLE] {
                write_txn.open_table(table).map_err(db_err("Failed to create table"))?;
            }
            write_txn.commit().map_err(db_err("Failed to commit table creation"))?;
        }

        Ok(Self { db: Arc::new(db) })
    }

    fn serialize<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(value).map_err(|e| {
            StoreError::SerializationError(format!("Failed to serialize {}: {}", what, e))
        })
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, StoreError> {
        serde_json::from_slice(bytes).map_err(|e| {
            StoreError::SerializationError(format!("Failed to deserialize {}: {}", what, e))
        })
    }

    /// Little-endian f32 values packed sequentially (4 bytes per value).
    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(embedding.len() * 4);
        for &val in embedding {
            bytes.extend_from_slice(&val.to_le_bytes());
        }
        bytes
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn put_raw(&self, table_def: U64Table, key: u64, bytes: &[u8]) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(db_err("Failed to begin write transaction"))?;
        {
            let mut table = write_txn
                .open_table(table_def)
                .map_err(db_err("Failed to open table"))?;
            table.insert(key, bytes).map_err(db_err("Failed to insert"))?;
        }
        write_txn.commit().map_err(db_err("Failed to commit"))?;
        Ok(())
    }

    fn get_raw(&self, table_def: U64Table, key: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;
        let table = read_txn.open_table(table_def).map_err(db_err("Failed to open table"))?;
        let value = table.get(key).map_err(db_err("Failed to get"))?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    /// All entries of a table in ascending key order.
    fn scan_raw(&self, table_def: U64Table) -> Result<Vec<(u64, Vec<u8>)>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;
        let table = read_txn.open_table(table_def).map_err(db_err("Failed to open table"))?;
        let iter = table.iter().map_err(db_err("Failed to iterate"))?;

        let mut entries = Vec::new();
        for result in iter {
            let (key, value) = result.map_err(db_err("Failed to read entry"))?;
            entries.push((key.value(), value.value().to_vec()));
        }
        Ok(entries)
    }
}

#[async_trait]
impl ChunkStore for RedbChunkStore {
    // =========================================================================
    // Chunk Operations
    // =========================================================================

    async fn put_chunk(&self, chunk: &ChunkRecord) -> Result<(), StoreError> {
        let bytes = Self::serialize(chunk, "chunk")?;
        self.put_raw(CHUNKS_TABLE, chunk.id.as_u64(), &bytes)
    }

    async fn get_chunk(&self, id: ChunkId) -> Result<Option<ChunkRecord>, StoreError> {
        self.get_raw(CHUNKS_TABLE, id.as_u64())?
            .map(|bytes| Self::deserialize(&bytes, "chunk"))
            .transpose()
    }

    async fn get_chunks_batch(&self, ids: &[ChunkId]) -> Result<Vec<ChunkRecord>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;
        let table = read_txn
            .open_table(CHUNKS_TABLE)
            .map_err(db_err("Failed to open chunks table"))?;

        let mut chunks = Vec::with_capacity(ids.len());
        for id in ids {
            let guard = table
                .get(id.as_u64())
                .map_err(db_err("Failed to get chunk"))?;
            if let Some(guard) = guard {
                chunks.push(Self::deserialize(guard.value(), "chunk")?);
            }
        }
        Ok(chunks)
    }

    async fn list_chunks(&self) -> Result<Vec<ChunkRecord>, StoreError> {
        self.scan_raw(CHUNKS_TABLE)?
            .into_iter()
            .map(|(_, bytes)| Self::deserialize(&bytes, "chunk"))
            .collect()
    }

    async fn chunk_count(&self) -> Result<usize, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(db_err("Failed to begin read transaction"))?;
        let table = read_txn
            .open_table(CHUNKS_TABLE)
            .map_err(db_err("Failed to open chunks table"))?;
        let count = table.len().map_err(db_err("Failed to get chunk count"))?;
        Ok(count as usize)
    }

    // =========================================================================
    // Embedding Operations
    // =========================================================================

    async fn put_embedding(&self, id: ChunkId, embedding: &[f32]) -> Result<(), StoreError> {
        let bytes = Self::serialize_embedding(embedding);
        self.put_raw(EMBEDDINGS_TABLE, id.as_u64(), &bytes)
    }

    async fn get_embedding(&self, id: ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        Ok(self
            .get_raw(EMBEDDINGS_TABLE, id.as_u64())?
            .map(|bytes| Self::deserialize_embedding(&bytes)))
    }

    async fn iter_embeddings(&self) -> Result<Vec<(ChunkId, Vec<f32>)>, StoreError> {
        Ok(self
            .scan_raw(EMBEDDINGS_TABLE)?
            .into_iter()
            .map(|(key, bytes)| (ChunkId::from_u64(key), Self::deserialize_embedding(&bytes)))
            .collect())
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    async fn put_document(&self, doc: &DocumentRecord) -> Result<(), StoreError> {
        let bytes = Self::serialize(doc, "document")?;
        self.put_raw(DOCUMENTS_TABLE, doc.id.as_u64(), &bytes)
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, StoreError> {
        self.get_raw(DOCUMENTS_TABLE, id.as_u64())?
            .map(|bytes| Self::deserialize(&bytes, "document"))
            .transpose()
    }

    async fn iter_document_ids(&self) -> Result<Vec<DocumentId>, StoreError> {
        Ok(self
            .scan_raw(DOCUMENTS_TABLE)?
            .into_iter()
            .map(|(key, _)| DocumentId::from_u64(key))
            .collect())
    }
}
