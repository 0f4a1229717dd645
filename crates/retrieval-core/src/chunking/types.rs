//! Types for text chunking.

use crate::search::types::Metadata;

/// Byte range of one source page within the extracted document text.
///
/// Produced by the extraction collaborator alongside the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// 1-based page number
    pub page_number: u32,
    /// Byte offset where the page starts
    pub start: usize,
    /// Byte offset where the page ends (exclusive)
    pub end: usize,
}

/// A chunk produced by the chunker, before it is assigned an id and stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// Index of this chunk in the document (0-based, global across pages)
    pub index: usize,
    /// The text content of this chunk
    pub text: String,
    /// Byte offset where this chunk starts in the original document
    pub start: usize,
    /// Byte offset where this chunk ends in the original document
    pub end: usize,
    /// Number of leading characters repeated from the previous chunk
    pub overlap: usize,
    /// Source page for page-aware chunks
    pub page_number: Option<u32>,
    /// chunk_index, total_chunks, chunk_size, chunking_strategy, page_number
    pub metadata: Metadata,
}

/// Byte span of a chunk inside the text being chunked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
}
