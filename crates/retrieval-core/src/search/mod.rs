//! Hybrid retrieval over indexed chunks.
//!
//! This module combines:
//! - **Vector search** (exact cosine similarity over chunk embeddings)
//! - **Keyword search** (BM25 over tokenized chunk text)
//! - **Reciprocal Rank Fusion** (RRF) to merge the two rankings
//! - **Cross-encoder reranking** of the fused shortlist (optional)
//!
//! # Architecture
//!
//! - `types`: Core types (ChunkId, ChunkRecord, Candidate, SearchMode, Source)
//! - `vector`: Cosine similarity index keyed by chunk id
//! - `keyword`: BM25 index, rebuildable from the chunk store
//! - `fusion`: Reciprocal Rank Fusion over ranked id lists
//! - `rerank`: Cross-encoder reranking with timeout and fallback
//! - `pipeline`: The query state machine tying the above together
//!
//! # Algorithm Details
//!
//! **Keyword Search (BM25)**:
//! - `idf = ln(1 + (N - df + 0.5) / (df + 0.5))`
//! - Tuned parameters: k1=1.5, b=0.75
//!
//! **Reciprocal Rank Fusion (RRF)**:
//! - Formula: `score = 1 / (k + rank)` where k=60
//! - Merges vector and keyword rankings without score normalization
//!
//! A chunk is only returned once it is present in both indices, so a query
//! never observes a half-indexed chunk.

pub mod fusion;
pub mod keyword;
pub mod pipeline;
pub mod rerank;
pub mod types;
pub mod vector;

pub use fusion::{FusedResult, FusionRanker};
pub use keyword::KeywordIndex;
pub use pipeline::{PipelineStage, QueryRequest, QueryResponse, RetrievalPipeline};
pub use rerank::{CrossEncoderProvider, CrossEncoderReranker};
pub use types::{
    Candidate, ChunkId, ChunkRecord, DocumentFormat, DocumentId, DocumentRecord, Metadata,
    SearchMode, Source, SourceScores,
};
pub use vector::VectorIndex;
