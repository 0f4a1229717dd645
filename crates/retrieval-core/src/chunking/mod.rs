//! Text chunking strategies for document ingestion.
//!
//! Strategies are a closed set selected by tag:
//!
//! - **recursive**: paragraph, then sentence, then whitespace boundaries, with
//!   `overlap` characters carried from the tail of the previous chunk
//! - **semantic**: whole sentences accumulated greedily, no overlap
//! - **pdf_page_aware**: recursive chunking applied independently to each
//!   source page, every chunk tagged with its page number
//!
//! All sizes are measured in characters. Offsets on [`ChunkDraft`] are byte
//! offsets into the original text.

mod recursive;
mod semantic;
mod types;

use crate::error::ChunkingError;
use crate::search::types::Metadata;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use types::{ChunkDraft, PageSpan};
use types::Span;

/// Chunking strategy tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    #[default]
    Recursive,
    Semantic,
    PdfPageAware,
}

impl ChunkingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkingStrategy::Recursive => "recursive",
            ChunkingStrategy::Semantic => "semantic",
            ChunkingStrategy::PdfPageAware => "pdf_page_aware",
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = ChunkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recursive" => Ok(ChunkingStrategy::Recursive),
            "semantic" => Ok(ChunkingStrategy::Semantic),
            "pdf_page_aware" => Ok(ChunkingStrategy::PdfPageAware),
            other => Err(ChunkingError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated strategy + size + overlap combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    strategy: ChunkingStrategy,
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// `ChunkingError::InvalidConfig` if `chunk_size` is zero or
    /// `overlap >= chunk_size`. The check applies to every strategy, even
    /// `semantic` which ignores the overlap.
    pub fn new(
        strategy: ChunkingStrategy,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            strategy,
            chunk_size,
            overlap,
        })
    }

    pub fn strategy(&self) -> ChunkingStrategy {
        self.strategy
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunks text that has no page structure.
    ///
    /// `pdf_page_aware` falls back to recursive chunking without page numbers.
    pub fn chunk(&self, text: &str) -> Vec<ChunkDraft> {
        let spans = match self.strategy {
            ChunkingStrategy::Semantic => semantic::split(text, self.chunk_size),
            ChunkingStrategy::Recursive | ChunkingStrategy::PdfPageAware => {
                recursive::split(text, self.chunk_size, self.overlap)
            }
        };
        let pieces = spans.into_iter().map(|span| (span, None)).collect();
        self.finish(text, pieces)
    }

    /// Chunks extracted text together with its page boundaries.
    ///
    /// Only `pdf_page_aware` uses the spans; other strategies chunk the whole
    /// text. Blank pages produce no chunks and overlap never crosses a page.
    ///
    /// # Errors
    ///
    /// `ChunkingError::InvalidPageSpan` if a span is reversed, out of bounds
    /// or not on a UTF-8 character boundary.
    pub fn chunk_pages(
        &self,
        text: &str,
        pages: &[PageSpan],
    ) -> Result<Vec<ChunkDraft>, ChunkingError> {
        validate_pages(text, pages)?;
        if self.strategy != ChunkingStrategy::PdfPageAware || pages.is_empty() {
            return Ok(self.chunk(text));
        }

        let mut pieces = Vec::new();
        for page in pages {
            let page_text = &text[page.start..page.end];
            for span in recursive::split(page_text, self.chunk_size, self.overlap) {
                let shifted = Span {
                    start: span.start + page.start,
                    end: span.end + page.start,
                    overlap: span.overlap,
                };
                pieces.push((shifted, Some(page.page_number)));
            }
        }
        Ok(self.finish(text, pieces))
    }

    fn finish(&self, text: &str, pieces: Vec<(Span, Option<u32>)>) -> Vec<ChunkDraft> {
        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, (span, page_number))| {
                let chunk_text = text[span.start..span.end].to_string();
                let mut metadata = Metadata::new();
                metadata.insert("chunk_index".to_string(), index.to_string());
                metadata.insert("total_chunks".to_string(), total.to_string());
                metadata.insert(
                    "chunk_size".to_string(),
                    chunk_text.chars().count().to_string(),
                );
                metadata.insert(
                    "chunking_strategy".to_string(),
                    self.strategy.as_str().to_string(),
                );
                if let Some(page) = page_number {
                    metadata.insert("page_number".to_string(), page.to_string());
                }
                ChunkDraft {
                    index,
                    text: chunk_text,
                    start: span.start,
                    end: span.end,
                    overlap: span.overlap,
                    page_number,
                    metadata,
                }
            })
            .collect()
    }
}

fn validate_pages(text: &str, pages: &[PageSpan]) -> Result<(), ChunkingError> {
    for page in pages {
        if page.start > page.end || page.end > text.len() {
            return Err(ChunkingError::InvalidPageSpan(format!(
                "page {} spans {}..{} but text is {} bytes",
                page.page_number,
                page.start,
                page.end,
                text.len()
            )));
        }
        if !text.is_char_boundary(page.start) || !text.is_char_boundary(page.end) {
            return Err(ChunkingError::InvalidPageSpan(format!(
                "page {} boundary {}..{} splits a character",
                page.page_number, page.start, page.end
            )));
        }
    }
    Ok(())
}

/// One-shot chunking: `Chunker::new(strategy, chunk_size, overlap)?.chunk(text)`.
pub fn chunk(
    text: &str,
    strategy: ChunkingStrategy,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkDraft>, ChunkingError> {
    Ok(Chunker::new(strategy, chunk_size, overlap)?.chunk(text))
}

/// One-shot page-aware chunking.
pub fn chunk_with_pages(
    text: &str,
    pages: &[PageSpan],
    strategy: ChunkingStrategy,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<ChunkDraft>, ChunkingError> {
    Chunker::new(strategy, chunk_size, overlap)?.chunk_pages(text, pages)
}
