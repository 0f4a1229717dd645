//! # Retrieval Core
//!
//! Hybrid retrieval and ranking engine for chunked unstructured text.
//!
//! Documents are split into chunks, embedded through an injected
//! [`embedding::EmbeddingProvider`], and indexed twice: once in a dense
//! [`search::vector::VectorIndex`] and once in a BM25
//! [`search::keyword::KeywordIndex`]. Queries run both indices concurrently,
//! merge the ranked lists with Reciprocal Rank Fusion and optionally reorder
//! the shortlist with an injected cross-encoder.
//!
//! ## Modules
//!
//! - [`engine`] - Caller-facing facade (query, add text, add document, rebuild)
//! - [`search`] - Vector + BM25 indices, RRF fusion, reranking, query pipeline
//! - [`indexing`] - Ingestion into both indices, load from store, rebuild
//! - [`chunking`] - Recursive, semantic and page-aware chunking strategies
//! - [`embedding`] - Embedding provider capability
//! - [`storage`] - Authoritative chunk store trait and backends
//! - [`config`] - Default constants and runtime configuration
//! - [`error`] - Error taxonomy

pub mod chunking;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod indexing;
pub mod search;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::RetrievalConfig;
pub use engine::RetrievalEngine;
pub use error::RetrievalError;
