use crate::config::PREVIEW_CHARS;
use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Returns the current Unix timestamp (seconds since UNIX_EPOCH).
///
/// Uses `instant::SystemTime` so the same code runs on native and WASM.
/// Returns 0 if the clock reads before the epoch.
pub fn get_current_timestamp() -> u64 {
    instant::SystemTime::now()
        .duration_since(instant::SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// String-to-string metadata attached to chunks and documents.
///
/// A `BTreeMap` so serialized records are stable regardless of insertion order.
pub type Metadata = BTreeMap<String, String>;

/// Unique chunk identifier.
///
/// Allocated monotonically by the [`IndexManager`](crate::indexing::IndexManager),
/// so id order is ingestion order. Both indices use it as their tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Creates a ChunkId from a raw u64 value.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk-{}", self.0)
    }
}

/// Unique document identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(u64);

impl DocumentId {
    /// Creates a DocumentId from a raw u64 value.
    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value of this ID.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// Source format of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    #[default]
    Text,
    Markdown,
    Pdf,
    Docx,
}

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Text => "text",
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::Docx => "docx",
        }
    }
}

/// Stored document. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    /// Raw extracted text
    pub text: String,
    pub format: DocumentFormat,
    /// Number of pages for paginated sources
    pub page_count: Option<u32>,
    /// Unix timestamp (seconds since UNIX_EPOCH)
    pub created_at: u64,
    pub metadata: Metadata,
}

/// Stored chunk: the unit of retrieval.
///
/// `document_id` is a lookup key into the chunk store, not an owning pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub text: String,
    /// Position of this chunk within its document (0-based)
    pub sequence: usize,
    /// Source page for page-aware chunks
    pub page_number: Option<u32>,
    pub metadata: Metadata,
}

/// One entry of a single-signal ranked list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub chunk_id: ChunkId,
    /// 1-based position within the list
    pub rank: usize,
    /// Raw signal score (cosine similarity or BM25)
    pub score: f32,
}

/// Which indices a query consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Dense vector similarity only
    Vector,
    /// BM25 only
    #[serde(alias = "bm25")]
    Keyword,
    /// Both, merged with RRF
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Vector => "vector",
            SearchMode::Keyword => "keyword",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl FromStr for SearchMode {
    type Err = RetrievalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vector" => Ok(SearchMode::Vector),
            "keyword" | "bm25" => Ok(SearchMode::Keyword),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(RetrievalError::InvalidConfig(format!(
                "unknown search mode '{}', expected vector, keyword or hybrid",
                other
            ))),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-signal scores attached to a [`Source`] when the caller asks for them.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SourceScores {
    /// Cosine similarity from vector search
    pub vector_similarity: Option<f32>,
    /// BM25 score from keyword search
    pub bm25: Option<f32>,
    /// Fused RRF score (hybrid mode only)
    pub rrf: Option<f32>,
    /// Cross-encoder relevance (only when reranked)
    pub cross_encoder: Option<f32>,
}

/// One retrieved chunk in a query response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    /// 1-based position in the response
    pub rank: usize,
    pub text: String,
    pub metadata: Metadata,
    pub scores: Option<SourceScores>,
}

impl Source {
    /// First [`PREVIEW_CHARS`] characters of the text, with `...` appended
    /// when the text was cut.
    pub fn preview(&self) -> String {
        let mut chars = self.text.char_indices();
        match chars.nth(PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &self.text[..cut]),
            None => self.text.clone(),
        }
    }
}
