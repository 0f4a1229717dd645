//! Error types for retrieval-core.
//!
//! Each concern (chunking, embedding, reranking, storage) has its own error
//! enum. [`RetrievalError`] is the taxonomy reported to callers of the
//! ingestion and query operations; every per-concern error converts into it.

use crate::storage::StoreError;
use thiserror::Error;

/// Errors produced while splitting text into chunks.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChunkingError {
    /// chunk_size / overlap combination is unusable
    #[error("Invalid chunking config: {0}")]
    InvalidConfig(String),
    /// Strategy tag not one of recursive, semantic, pdf_page_aware
    #[error("Unknown chunking strategy: {0}")]
    UnknownStrategy(String),
    /// Page span out of bounds or not on a character boundary
    #[error("Invalid page span: {0}")]
    InvalidPageSpan(String),
}

/// Errors raised by an [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbeddingError {
    /// Model not reachable or inference failed
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned a vector of the wrong size
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured for the collection
        expected: usize,
        /// Dimension actually returned
        actual: usize,
    },
}

/// Errors raised by a [`CrossEncoderProvider`](crate::search::rerank::CrossEncoderProvider).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RerankError {
    /// Scoring model not reachable or inference failed
    #[error("Cross-encoder unavailable: {0}")]
    Unavailable(String),
    /// Provider returned a different number of scores than passages
    #[error("Cross-encoder returned {actual} scores for {expected} passages")]
    ScoreCountMismatch {
        /// Number of passages sent
        expected: usize,
        /// Number of scores received
        actual: usize,
    },
}

/// Caller-facing error taxonomy for ingestion and query operations.
///
/// `Clone` so that non-fatal errors can travel inside a successful response
/// as warnings (see [`QueryResponse::warnings`](crate::search::QueryResponse)).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetrievalError {
    /// Bad mode, chunk_size/overlap or n_results. Nothing was mutated.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Embedding provider failed; fatal to the affected call
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),
    /// Cross-encoder failed; the pipeline degrades to the fused order
    #[error("Rerank unavailable: {0}")]
    RerankUnavailable(String),
    /// Vector and keyword indices disagree with the chunk store
    #[error(
        "Index inconsistency: {stored_chunks} stored chunks, {vector_entries} vector entries, {keyword_entries} keyword entries"
    )]
    IndexInconsistency {
        /// Chunks in the authoritative store
        stored_chunks: usize,
        /// Entries in the vector index
        vector_entries: usize,
        /// Chunks in the keyword index
        keyword_entries: usize,
    },
    /// An external call exceeded its time budget
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        /// Which external call timed out ("embedding", "rerank")
        operation: String,
        /// Budget that was exceeded
        timeout_ms: u64,
    },
    /// Embedding size does not match the collection dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Collection dimension
        expected: usize,
        /// Offending vector length
        actual: usize,
    },
    /// Chunk store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RetrievalError {
    /// Returns `true` for errors that abort the request.
    ///
    /// `RerankUnavailable` and `IndexInconsistency` only degrade a response.
    /// `Timeout` is only raised for embedding calls; a cross-encoder timeout
    /// is reported as `RerankUnavailable`.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            RetrievalError::RerankUnavailable(_) | RetrievalError::IndexInconsistency { .. }
        )
    }
}

impl From<ChunkingError> for RetrievalError {
    fn from(err: ChunkingError) -> Self {
        RetrievalError::InvalidConfig(err.to_string())
    }
}

impl From<EmbeddingError> for RetrievalError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::Unavailable(msg) => RetrievalError::EmbeddingUnavailable(msg),
            EmbeddingError::DimensionMismatch { expected, actual } => {
                RetrievalError::DimensionMismatch { expected, actual }
            }
        }
    }
}

impl From<RerankError> for RetrievalError {
    fn from(err: RerankError) -> Self {
        RetrievalError::RerankUnavailable(err.to_string())
    }
}

impl From<StoreError> for RetrievalError {
    fn from(err: StoreError) -> Self {
        RetrievalError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_error_maps_to_invalid_config() {
        let err: RetrievalError = ChunkingError::InvalidConfig("overlap too large".into()).into();
        assert!(matches!(err, RetrievalError::InvalidConfig(msg) if msg.contains("overlap")));
    }

    #[test]
    fn test_embedding_dimension_error_keeps_sizes() {
        let err: RetrievalError = EmbeddingError::DimensionMismatch {
            expected: 4,
            actual: 3,
        }
        .into();
        assert_eq!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_degrading_errors_are_not_fatal() {
        assert!(!RetrievalError::RerankUnavailable("down".into()).is_fatal());
        assert!(!RetrievalError::IndexInconsistency {
            stored_chunks: 2,
            vector_entries: 2,
            keyword_entries: 1
        }
        .is_fatal());
        assert!(RetrievalError::EmbeddingUnavailable("down".into()).is_fatal());
        assert!(RetrievalError::Timeout {
            operation: "embedding".into(),
            timeout_ms: 10
        }
        .is_fatal());
    }
}
