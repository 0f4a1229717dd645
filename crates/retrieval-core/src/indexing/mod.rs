//! Ingestion and index lifecycle.
//!
//! The [`IndexManager`] coordinates:
//! 1. **Chunking**: splits text with the requested strategy
//! 2. **Embedding**: embeds every chunk before anything is written
//! 3. **Storage**: persists document, chunks and embeddings to the chunk store
//! 4. **Indexing**: upserts into the vector index, then adds the batch to
//!    the keyword index
//!
//! It also rebuilds the indices from the store at startup, rebuilds the
//! keyword index on demand, and reports count mismatches between the three.
//!
//! # Example
//!
//! ```ignore
//! use retrieval_core::indexing::{AddTextRequest, IndexManager};
//!
//! let manager = IndexManager::load(store, embedder, RetrievalConfig::default()).await?;
//! let response = manager
//!     .add_text(AddTextRequest::new(text).with_chunk_size(500))
//!     .await?;
//! println!("{} chunks", response.chunks_created);
//! ```

mod manager;
mod types;

pub use manager::IndexManager;
pub use types::{
    AddDocumentRequest, AddTextRequest, ConsistencyReport, IngestResponse, IngestStatus,
    LoadReport, RebuildResponse,
};
