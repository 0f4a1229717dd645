use super::types::{
    AddDocumentRequest, AddTextRequest, ConsistencyReport, IngestResponse, IngestStatus,
    LoadReport, RebuildResponse,
};
use crate::chunking::{ChunkDraft, Chunker, ChunkingStrategy};
use crate::config::RetrievalConfig;
use crate::embedding::{embed_with_timeout, EmbeddingProvider};
use crate::error::RetrievalError;
use crate::search::keyword::KeywordIndex;
use crate::search::types::{
    get_current_timestamp, ChunkId, ChunkRecord, DocumentFormat, DocumentId, DocumentRecord,
    Metadata,
};
use crate::search::vector::VectorIndex;
use crate::storage::ChunkStore;
use instant::Instant;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

/// Source tag for text added without an explicit `source` metadata entry.
const DIRECT_TEXT_SOURCE: &str = "direct_text";

/// Owns the chunk store and both indices and keeps them in step.
///
/// The chunk store is authoritative: both indices can be rebuilt from it,
/// and every ingested chunk is written to the store before it is indexed.
///
/// # Thread Safety
///
/// All methods take `&self`. Ingestion calls may run concurrently with each
/// other and with queries. [`reload`](Self::reload) waits for in-flight
/// ingestion writes and holds new ones off until both indices are rebuilt.
/// Chunk and document ids come from atomic counters seeded from the store on
/// [`load`](Self::load), so ids are unique and increase in allocation order.
pub struct IndexManager {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    vector: VectorIndex,
    keyword: KeywordIndex,
    next_chunk_id: AtomicU64,
    next_document_id: AtomicU64,
    /// Shared by ingestion writes, exclusive for `reload`
    ingest_gate: RwLock<()>,
    config: RetrievalConfig,
}

impl IndexManager {
    /// Creates a manager over `store` and rebuilds both indices from it.
    ///
    /// The vector dimension is taken from `embedder`.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `config` does not validate, `Storage` if the store
    /// cannot be read.
    pub async fn load(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        let manager = Self {
            vector: VectorIndex::new(embedder.dimension()),
            keyword: KeywordIndex::new(config.bm25),
            store,
            embedder,
            next_chunk_id: AtomicU64::new(0),
            next_document_id: AtomicU64::new(0),
            ingest_gate: RwLock::new(()),
            config,
        };
        manager.reload().await?;
        Ok(manager)
    }

    /// Tears down both indices and rebuilds them from the chunk store.
    ///
    /// Stored embeddings without a chunk record, or with a dimension other
    /// than the provider's, are skipped with a warning.
    #[instrument(skip_all)]
    pub async fn reload(&self) -> Result<LoadReport, RetrievalError> {
        let _gate = self.ingest_gate.write().await;
        let start = Instant::now();
        let dimension = self.vector.dimension();

        let chunks = self.store.list_chunks().await?;
        let metadata: HashMap<ChunkId, &Metadata> =
            chunks.iter().map(|c| (c.id, &c.metadata)).collect();

        let mut entries = Vec::new();
        let mut skipped_embeddings = 0;
        let mut max_chunk_id = chunks.iter().map(|c| c.id.as_u64()).max();
        for (chunk_id, embedding) in self.store.iter_embeddings().await? {
            max_chunk_id = max_chunk_id.max(Some(chunk_id.as_u64()));
            let Some(chunk_metadata) = metadata.get(&chunk_id) else {
                warn!("Skipping embedding for {}: no stored chunk", chunk_id);
                skipped_embeddings += 1;
                continue;
            };
            if embedding.len() != dimension {
                warn!(
                    "Skipping embedding for {}: dimension {} (expected {})",
                    chunk_id,
                    embedding.len(),
                    dimension
                );
                skipped_embeddings += 1;
                continue;
            }
            entries.push((chunk_id, embedding, (*chunk_metadata).clone()));
        }

        let vector_entries = self.vector.replace_all(entries)?;
        let keyword_entries = self.keyword.rebuild(self.store.as_ref()).await?;

        let max_document_id = self
            .store
            .iter_document_ids()
            .await?
            .into_iter()
            .map(|id| id.as_u64())
            .chain(chunks.iter().map(|c| c.document_id.as_u64()))
            .max();
        if let Some(max) = max_chunk_id {
            self.next_chunk_id.fetch_max(max + 1, Ordering::SeqCst);
        }
        if let Some(max) = max_document_id {
            self.next_document_id.fetch_max(max + 1, Ordering::SeqCst);
        }

        let report = LoadReport {
            stored_chunks: chunks.len(),
            vector_entries,
            keyword_entries,
            skipped_embeddings,
        };
        info!(
            "Loaded indices: {} chunks, {} vector entries, {} keyword entries ({} skipped) in {:.1}ms",
            report.stored_chunks,
            report.vector_entries,
            report.keyword_entries,
            report.skipped_embeddings,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(report)
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn vector(&self) -> &VectorIndex {
        &self.vector
    }

    pub fn keyword(&self) -> &KeywordIndex {
        &self.keyword
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Resolves per-request chunking overrides against the configured defaults.
    ///
    /// An explicit chunk size without an explicit overlap scales the default
    /// overlap by the same ratio, so a small chunk size does not trip the
    /// overlap check.
    fn chunker(
        &self,
        strategy: Option<ChunkingStrategy>,
        chunk_size: Option<usize>,
        overlap: Option<usize>,
    ) -> Result<Chunker, RetrievalError> {
        let defaults = &self.config.chunking;
        let size = chunk_size.unwrap_or(defaults.chunk_size);
        let overlap = match (overlap, chunk_size) {
            (Some(overlap), _) => overlap,
            (None, None) => defaults.overlap,
            (None, Some(size)) => defaults.overlap.saturating_mul(size) / defaults.chunk_size,
        };
        Ok(Chunker::new(
            strategy.unwrap_or(defaults.strategy),
            size,
            overlap,
        )?)
    }

    /// Indexes plain text.
    ///
    /// Chunks are tagged `source = "direct_text"` unless the request sets a
    /// source. With `chunk = false` the whole text is one chunk and the
    /// chunking parameters are ignored.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for unusable chunking parameters (nothing is stored)
    /// - `EmbeddingUnavailable` / `Timeout` / `DimensionMismatch` if any
    ///   chunk fails to embed (nothing is stored)
    /// - `Storage` if the document record cannot be written
    ///
    /// Failures after the first chunk is stored are reported through
    /// [`IngestStatus::Partial`] instead.
    #[instrument(skip_all, fields(text_len = request.text.len(), chunk = request.chunk))]
    pub async fn add_text(&self, request: AddTextRequest) -> Result<IngestResponse, RetrievalError> {
        let AddTextRequest {
            text,
            chunk,
            strategy,
            chunk_size,
            overlap,
            mut metadata,
        } = request;

        let drafts = if chunk {
            self.chunker(strategy, chunk_size, overlap)?.chunk(&text)
        } else {
            whole_text(&text)
        };
        metadata
            .entry("source".to_string())
            .or_insert_with(|| DIRECT_TEXT_SOURCE.to_string());

        self.ingest(text, DocumentFormat::Text, None, drafts, metadata)
            .await
    }

    /// Indexes extracted document text with its page layout.
    ///
    /// # Errors
    ///
    /// As [`add_text`](Self::add_text), plus `InvalidConfig` for page spans
    /// that do not fit the text.
    #[instrument(skip_all, fields(format = request.format.as_str(), pages = request.pages.len()))]
    pub async fn add_document(
        &self,
        request: AddDocumentRequest,
    ) -> Result<IngestResponse, RetrievalError> {
        let AddDocumentRequest {
            text,
            pages,
            format,
            strategy,
            chunk_size,
            overlap,
            metadata,
        } = request;

        let strategy =
            strategy.or_else(|| (!pages.is_empty()).then_some(ChunkingStrategy::PdfPageAware));
        let drafts = self
            .chunker(strategy, chunk_size, overlap)?
            .chunk_pages(&text, &pages)?;
        let page_count = (!pages.is_empty()).then(|| pages.len() as u32);

        self.ingest(text, format, page_count, drafts, metadata).await
    }

    async fn ingest(
        &self,
        text: String,
        format: DocumentFormat,
        page_count: Option<u32>,
        drafts: Vec<ChunkDraft>,
        metadata: Metadata,
    ) -> Result<IngestResponse, RetrievalError> {
        if drafts.is_empty() {
            debug!("No chunks produced, nothing to index");
            return Ok(IngestResponse::empty());
        }
        let start = Instant::now();

        let embeddings = self.embed_all(&drafts).await?;
        let _gate = self.ingest_gate.read().await;

        let document_id =
            DocumentId::from_u64(self.next_document_id.fetch_add(1, Ordering::SeqCst));
        let document = DocumentRecord {
            id: document_id,
            text,
            format,
            page_count,
            created_at: get_current_timestamp(),
            metadata: metadata.clone(),
        };
        self.store.put_document(&document).await?;

        let mut stored: Vec<ChunkRecord> = Vec::with_capacity(drafts.len());
        let mut interrupted = None;
        for (draft, embedding) in drafts.into_iter().zip(embeddings) {
            let chunk_id = ChunkId::from_u64(self.next_chunk_id.fetch_add(1, Ordering::SeqCst));
            let record = chunk_record(chunk_id, document_id, format, &metadata, draft);

            let persisted = match self.store.put_embedding(chunk_id, &embedding).await {
                Ok(()) => self.store.put_chunk(&record).await,
                Err(err) => Err(err),
            };
            if let Err(err) = persisted {
                warn!("Stopping ingestion at {}: {}", chunk_id, err);
                interrupted = Some(format!("failed to store {}: {}", chunk_id, err));
                break;
            }

            if let Err(err) = self.vector.upsert(chunk_id, embedding, record.metadata.clone()) {
                warn!("Stopping ingestion at {}: {}", chunk_id, err);
                interrupted = Some(format!(
                    "{} is stored but not indexed, reload to repair: {}",
                    chunk_id, err
                ));
                break;
            }
            stored.push(record);
        }

        let status = match self.keyword.add_batch(&stored).await {
            Ok(_) => match interrupted {
                None => IngestStatus::Complete,
                Some(reason) => IngestStatus::Partial {
                    reason,
                    rebuild_required: false,
                },
            },
            Err(err) => {
                warn!(
                    "Keyword index update failed for {} chunks, rebuild required: {}",
                    stored.len(),
                    err
                );
                IngestStatus::Partial {
                    reason: format!("keyword index update failed: {}", err),
                    rebuild_required: true,
                }
            }
        };

        let ids: Vec<ChunkId> = stored.iter().map(|c| c.id).collect();
        info!(
            "Indexed {} chunks for {} in {:.1}ms",
            ids.len(),
            document_id,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(IngestResponse {
            document: Some(document),
            chunks_created: ids.len(),
            ids,
            status,
        })
    }

    /// Embeds every draft before anything is written.
    async fn embed_all(&self, drafts: &[ChunkDraft]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let timeout = Duration::from_millis(self.config.embedding_timeout_ms);
        let mut embeddings = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let embedding = embed_with_timeout(self.embedder.as_ref(), &draft.text, timeout).await?;
            if embedding.len() != self.vector.dimension() {
                return Err(RetrievalError::DimensionMismatch {
                    expected: self.vector.dimension(),
                    actual: embedding.len(),
                });
            }
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }

    /// Recomputes the keyword index from the chunk store.
    #[instrument(skip_all)]
    pub async fn rebuild_keyword_index(&self) -> Result<RebuildResponse, RetrievalError> {
        let rebuilt_entries = self.keyword.rebuild(self.store.as_ref()).await?;
        Ok(RebuildResponse { rebuilt_entries })
    }

    /// Compares entry counts of the store and both indices.
    ///
    /// Counts can briefly disagree while an ingestion call is between its
    /// store write and its index updates.
    pub async fn consistency_report(&self) -> Result<ConsistencyReport, RetrievalError> {
        Ok(ConsistencyReport {
            stored_chunks: self.store.chunk_count().await?,
            vector_entries: self.vector.len(),
            keyword_entries: self.keyword.len(),
        })
    }
}

/// A single unsplit chunk, or nothing for blank text.
fn whole_text(text: &str) -> Vec<ChunkDraft> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let mut metadata = Metadata::new();
    metadata.insert("chunk_index".to_string(), "0".to_string());
    metadata.insert("total_chunks".to_string(), "1".to_string());
    metadata.insert("chunk_size".to_string(), text.chars().count().to_string());
    metadata.insert("chunking_strategy".to_string(), "none".to_string());
    vec![ChunkDraft {
        index: 0,
        text: text.to_string(),
        start: 0,
        end: text.len(),
        overlap: 0,
        page_number: None,
        metadata,
    }]
}

fn chunk_record(
    id: ChunkId,
    document_id: DocumentId,
    format: DocumentFormat,
    document_metadata: &Metadata,
    draft: ChunkDraft,
) -> ChunkRecord {
    let mut metadata = document_metadata.clone();
    metadata.extend(draft.metadata);
    metadata.insert("document_id".to_string(), document_id.as_u64().to_string());
    metadata.insert("format".to_string(), format.as_str().to_string());
    ChunkRecord {
        id,
        document_id,
        text: draft.text,
        sequence: draft.index,
        page_number: draft.page_number,
        metadata,
    }
}

#[cfg(test)]
mod tests;
