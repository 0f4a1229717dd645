//! Persistence for chunks, embeddings and documents.
//!
//! # Implementations
//!
//! - [`InMemoryChunkStore`] - BTreeMap-backed, nothing persisted
//! - [`RedbChunkStore`] - redb database file (feature `redb-store`, on by default)

mod chunk_store;

#[cfg(feature = "redb-store")]
mod redb_store;

pub use chunk_store::{ChunkStore, InMemoryChunkStore, StoreError};

#[cfg(feature = "redb-store")]
pub use redb_store::RedbChunkStore;
