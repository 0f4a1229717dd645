//! Sentence-aligned chunking.
//!
//! Sentences are accumulated greedily until the next one would push the
//! chunk past `chunk_size` characters. A sentence is never split, so a single
//! sentence longer than `chunk_size` becomes its own chunk. No overlap.

use super::types::Span;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+").expect("valid sentence end regex"));

/// Byte ranges of the sentences in `text`, trimmed, blank ones dropped.
pub(crate) fn sentences(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for m in SENTENCE_END.find_iter(text) {
        push_trimmed(text, cursor..m.end(), &mut out);
        cursor = m.end();
    }
    push_trimmed(text, cursor..text.len(), &mut out);
    out
}

fn push_trimmed(text: &str, range: Range<usize>, out: &mut Vec<Range<usize>>) {
    let raw = &text[range.clone()];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = range.start + (raw.len() - raw.trim_start().len());
    out.push(start..start + trimmed.len());
}

pub(crate) fn split(text: &str, chunk_size: usize) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut group: Option<(Range<usize>, usize)> = None;

    for sentence in sentences(text) {
        group = match group {
            Some((range, chars)) => {
                // the gap between sentences stays inside the chunk
                let added = text[range.end..sentence.end].chars().count();
                if chars + added <= chunk_size {
                    Some((range.start..sentence.end, chars + added))
                } else {
                    spans.push(Span {
                        start: range.start,
                        end: range.end,
                        overlap: 0,
                    });
                    let chars = text[sentence.clone()].chars().count();
                    Some((sentence, chars))
                }
            }
            None => {
                let chars = text[sentence.clone()].chars().count();
                Some((sentence, chars))
            }
        };
    }

    if let Some((range, _)) = group {
        spans.push(Span {
            start: range.start,
            end: range.end,
            overlap: 0,
        });
    }
    spans
}
