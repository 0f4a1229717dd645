//! Caller-facing facade over ingestion and retrieval.
//!
//! # Usage
//!
//! ```ignore
//! use retrieval_core::{RetrievalConfig, RetrievalEngine};
//! use retrieval_core::indexing::AddTextRequest;
//! use retrieval_core::search::{QueryRequest, SearchMode};
//!
//! let engine = RetrievalEngine::open(store, embedder, Some(cross_encoder), config).await?;
//! engine.add_text(AddTextRequest::new(text)).await?;
//!
//! let response = engine
//!     .query(&QueryRequest::new("how are ranks fused?").with_mode(SearchMode::Hybrid))
//!     .await?;
//! for source in &response.sources {
//!     println!("{}. {}", source.rank, source.preview());
//! }
//! ```

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::RetrievalError;
use crate::indexing::{
    AddDocumentRequest, AddTextRequest, ConsistencyReport, IndexManager, IngestResponse,
    LoadReport, RebuildResponse,
};
use crate::search::pipeline::{QueryRequest, QueryResponse, RetrievalPipeline};
use crate::search::rerank::CrossEncoderProvider;
use crate::search::types::{DocumentId, DocumentRecord};
use crate::storage::ChunkStore;
use std::sync::Arc;
use tracing::info;

/// Hybrid retrieval engine: one chunk store, its two indices, and the query pipeline.
///
/// Cheap to share behind an `Arc`; every operation takes `&self`.
pub struct RetrievalEngine {
    manager: Arc<IndexManager>,
    pipeline: RetrievalPipeline,
}

impl RetrievalEngine {
    /// Opens an engine over `store`, rebuilding both indices from it.
    ///
    /// Without a cross-encoder, queries asking for reranking come back with
    /// `reranked = false` and a `RerankUnavailable` warning.
    pub async fn open(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        cross_encoder: Option<Arc<dyn CrossEncoderProvider>>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        let manager = Arc::new(IndexManager::load(store, embedder, config.clone()).await?);
        info!(
            "Retrieval engine ready ({} chunks, reranker: {})",
            manager.vector().len(),
            cross_encoder.is_some()
        );
        Ok(Self {
            pipeline: RetrievalPipeline::new(manager.clone(), cross_encoder, config),
            manager,
        })
    }

    /// Opens an engine backed by a redb database file at `path`.
    #[cfg(feature = "redb-store")]
    pub async fn open_redb<P: AsRef<std::path::Path>>(
        path: P,
        embedder: Arc<dyn EmbeddingProvider>,
        cross_encoder: Option<Arc<dyn CrossEncoderProvider>>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        let store = crate::storage::RedbChunkStore::open(path)?;
        Self::open(Arc::new(store), embedder, cross_encoder, config).await
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, RetrievalError> {
        self.pipeline.query(request).await
    }

    pub async fn add_text(&self, request: AddTextRequest) -> Result<IngestResponse, RetrievalError> {
        self.manager.add_text(request).await
    }

    pub async fn add_document(
        &self,
        request: AddDocumentRequest,
    ) -> Result<IngestResponse, RetrievalError> {
        self.manager.add_document(request).await
    }

    pub async fn rebuild_keyword_index(&self) -> Result<RebuildResponse, RetrievalError> {
        self.manager.rebuild_keyword_index().await
    }

    /// Rebuilds both indices from the chunk store.
    pub async fn reload(&self) -> Result<LoadReport, RetrievalError> {
        self.manager.reload().await
    }

    pub async fn consistency_report(&self) -> Result<ConsistencyReport, RetrievalError> {
        self.manager.consistency_report().await
    }

    pub async fn document(&self, id: DocumentId) -> Result<Option<DocumentRecord>, RetrievalError> {
        Ok(self.manager.store().get_document(id).await?)
    }

    pub fn manager(&self) -> &Arc<IndexManager> {
        &self.manager
    }
}
