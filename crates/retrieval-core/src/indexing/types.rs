//! Request and response types for ingestion.

use crate::chunking::{ChunkingStrategy, PageSpan};
use crate::error::RetrievalError;
use crate::search::types::{ChunkId, DocumentFormat, DocumentRecord, Metadata};

/// Plain text to index.
#[derive(Debug, Clone, PartialEq)]
pub struct AddTextRequest {
    pub text: String,
    /// When false the whole text becomes a single chunk
    pub chunk: bool,
    /// Overrides the configured default strategy
    pub strategy: Option<ChunkingStrategy>,
    /// Overrides the configured default chunk size (characters)
    pub chunk_size: Option<usize>,
    /// Overrides the default overlap (characters)
    pub overlap: Option<usize>,
    /// Attached to the document and every chunk
    pub metadata: Metadata,
}

impl AddTextRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            chunk: true,
            strategy: None,
            chunk_size: None,
            overlap: None,
            metadata: Metadata::new(),
        }
    }

    /// Index the text as one chunk.
    pub fn whole(mut self) -> Self {
        self.chunk = false;
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = Some(overlap);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Extracted document text with its page layout.
///
/// Extraction itself happens outside the core; `pages` are byte ranges into
/// `text` and may be empty for formats without pages.
#[derive(Debug, Clone, PartialEq)]
pub struct AddDocumentRequest {
    pub text: String,
    pub pages: Vec<PageSpan>,
    pub format: DocumentFormat,
    /// Defaults to `pdf_page_aware` when pages are given, else the configured default
    pub strategy: Option<ChunkingStrategy>,
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
    pub metadata: Metadata,
}

impl AddDocumentRequest {
    pub fn new(text: impl Into<String>, format: DocumentFormat) -> Self {
        Self {
            text: text.into(),
            pages: Vec::new(),
            format,
            strategy: None,
            chunk_size: None,
            overlap: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_pages(mut self, pages: Vec<PageSpan>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = Some(overlap);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome of an ingestion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    /// Every chunk is stored and present in both indices
    Complete,
    /// Ingestion stopped early or an index update failed.
    ///
    /// Chunks listed in the response are durably stored. With
    /// `rebuild_required` the keyword index is missing them until
    /// `rebuild_keyword_index` runs.
    Partial {
        reason: String,
        rebuild_required: bool,
    },
}

/// Result of `add_text` / `add_document`.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestResponse {
    /// The stored document, `None` when the input produced no chunks
    pub document: Option<DocumentRecord>,
    pub chunks_created: usize,
    pub ids: Vec<ChunkId>,
    pub status: IngestStatus,
}

impl IngestResponse {
    pub(crate) fn empty() -> Self {
        Self {
            document: None,
            chunks_created: 0,
            ids: Vec::new(),
            status: IngestStatus::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == IngestStatus::Complete
    }
}

/// Result of `rebuild_keyword_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildResponse {
    pub rebuilt_entries: usize,
}

/// Counts reported by the last [`IndexManager::reload`](super::IndexManager::reload).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub stored_chunks: usize,
    pub vector_entries: usize,
    pub keyword_entries: usize,
    /// Embeddings without a chunk record or with the wrong dimension
    pub skipped_embeddings: usize,
}

/// Entry counts of the chunk store and both indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub stored_chunks: usize,
    pub vector_entries: usize,
    pub keyword_entries: usize,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.stored_chunks == self.vector_entries && self.stored_chunks == self.keyword_entries
    }

    /// `IndexInconsistency` if the counts disagree.
    pub fn to_warning(&self) -> Option<RetrievalError> {
        (!self.is_consistent()).then_some(RetrievalError::IndexInconsistency {
            stored_chunks: self.stored_chunks,
            vector_entries: self.vector_entries,
            keyword_entries: self.keyword_entries,
        })
    }
}
