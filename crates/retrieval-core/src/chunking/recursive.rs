//! Recursive character chunking.
//!
//! The text is first cut into contiguous segments no longer than
//! `chunk_size - overlap` characters, trying paragraph boundaries first, then
//! sentence boundaries, then word boundaries, where words and the whitespace
//! between them become separate segments. Segments are then packed greedily
//! into chunks of at most `chunk_size` characters, each chunk after the first
//! starting with the tail of its predecessor. Whitespace fills the end of a
//! chunk as far as it fits and the rest travels with the following word, so
//! a chunk is only blank when no word fits beside the whitespace.
//!
//! Segments cover the text without gaps, so dropping each chunk's leading
//! `overlap` characters and concatenating gives back the original text.

use super::types::Span;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static SENTENCE_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+\s+|\n+").expect("valid sentence break regex"));

#[derive(Debug, Clone, Copy)]
enum Level {
    Paragraph,
    Sentence,
    Word,
    /// Characters of a whitespace run
    Blank,
}

impl Level {
    fn finer(self) -> Option<Level> {
        match self {
            Level::Paragraph => Some(Level::Sentence),
            Level::Sentence => Some(Level::Word),
            Level::Word | Level::Blank => None,
        }
    }
}

/// Splits `text` into overlapping chunk spans.
///
/// Callers guarantee `overlap < chunk_size`.
pub(crate) fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<Span> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let budget = chunk_size.saturating_sub(overlap).max(1);
    let mut segments = Vec::new();
    segment(text, 0..text.len(), Some(Level::Paragraph), budget, &mut segments);
    pack(text, &segments, chunk_size, overlap)
}

fn segment(
    text: &str,
    range: Range<usize>,
    level: Option<Level>,
    budget: usize,
    out: &mut Vec<Range<usize>>,
) {
    let piece = &text[range.clone()];
    let level = match level {
        Some(level) if piece.chars().count() > budget => level,
        // whitespace is packed a character at a time
        _ if is_blank(piece) && piece.chars().nth(1).is_some() => Level::Blank,
        // fits, or an indivisible token
        _ => {
            out.push(range);
            return;
        }
    };

    let mut cursor = range.start;
    for end in cut_points(piece, level) {
        let absolute = range.start + end;
        segment(text, cursor..absolute, level.finer(), budget, out);
        cursor = absolute;
    }
}

/// Relative end offsets of the pieces `piece` splits into at `level`.
/// Always ends with `piece.len()`, never yields an empty piece.
fn cut_points(piece: &str, level: Level) -> Vec<usize> {
    let raw: Vec<usize> = match level {
        Level::Paragraph => piece.match_indices("\n\n").map(|(i, m)| i + m.len()).collect(),
        Level::Sentence => SENTENCE_BREAK.find_iter(piece).map(|m| m.end()).collect(),
        Level::Word => {
            let mut previous: Option<bool> = None;
            piece
                .char_indices()
                .filter_map(|(i, c)| {
                    let blank = c.is_whitespace();
                    let boundary = previous.is_some_and(|p| p != blank);
                    previous = Some(blank);
                    boundary.then_some(i)
                })
                .collect()
        }
        Level::Blank => piece
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect(),
    };

    let mut cuts = Vec::with_capacity(raw.len() + 1);
    let mut last = 0;
    for end in raw {
        if end > last && end < piece.len() {
            cuts.push(end);
            last = end;
        }
    }
    cuts.push(piece.len());
    cuts
}

fn pack(text: &str, segments: &[Range<usize>], chunk_size: usize, overlap: usize) -> Vec<Span> {
    let mut spans = Vec::new();
    let Some(first) = segments.first() else {
        return spans;
    };
    let chars: Vec<usize> = segments
        .iter()
        .map(|seg| text[seg.clone()].chars().count())
        .collect();

    let mut current = Span {
        start: first.start,
        end: first.end,
        overlap: 0,
    };
    let mut current_chars = chars[0];

    for (i, seg) in segments.iter().enumerate().skip(1) {
        if current_chars + chars[i] <= chunk_size {
            current.end = seg.end;
            current_chars += chars[i];
            continue;
        }

        spans.push(current);
        // Leave room for a blank segment and the word after it, else for
        // the segment alone. The carried tail shrinks to fit, down to
        // nothing when the segment alone exceeds chunk_size.
        let run = run_chars(text, &segments[i..], &chars[i..]);
        let reserve = if run <= chunk_size { run } else { chars[i] };
        let carry = overlap
            .min(current_chars)
            .min(chunk_size.saturating_sub(reserve));
        current = Span {
            start: tail_start(text, current.start..current.end, carry),
            end: seg.end,
            overlap: carry,
        };
        current_chars = carry + chars[i];
    }
    spans.push(current);
    spans
}

/// Characters from the first segment through the first non-blank one.
fn run_chars(text: &str, segments: &[Range<usize>], chars: &[usize]) -> usize {
    let mut total = 0;
    for (seg, n) in segments.iter().zip(chars) {
        total += n;
        if !is_blank(&text[seg.clone()]) {
            break;
        }
    }
    total
}

fn is_blank(piece: &str) -> bool {
    piece.chars().all(char::is_whitespace)
}

/// Byte offset where the last `n` characters of `range` begin.
fn tail_start(text: &str, range: Range<usize>, n: usize) -> usize {
    if n == 0 {
        return range.end;
    }
    text[range.clone()]
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| range.start + i)
        .unwrap_or(range.start)
}
