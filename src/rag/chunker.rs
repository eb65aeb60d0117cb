//! Character-count text splitter.
//!
//! Chunks are contiguous spans of the source text. Each chunk ends at the
//! latest paragraph break, line break or space that keeps it within
//! `chunk_size` characters, falling back to a hard cut between characters.
//! The next chunk starts exactly `chunk_overlap` characters before the
//! previous one ended, so dropping the first `chunk_overlap` characters of
//! every chunk but the first and concatenating gives back the original text.

use crate::types::{AppError, Result};
use std::ops::Range;

/// Break points tried in order of preference.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into overlapping chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let bounds = char_bounds(text);
        self.spans(text)
            .into_iter()
            .map(|span| text[bounds[span.start]..bounds[span.end]].to_string())
            .collect()
    }

    /// Chunk boundaries as character ranges into `text`.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let bounds = char_bounds(text);
        let total = bounds.len() - 1;
        let mut spans = Vec::new();
        let mut start = 0;

        while start < total {
            if total - start <= self.chunk_size {
                spans.push(start..total);
                break;
            }

            let limit = start + self.chunk_size;
            // The break must land past the overlap or the next chunk would not advance
            let min_end = start + self.chunk_overlap + 1;
            let end = self
                .find_break(text, &bounds, start, min_end, limit)
                .unwrap_or(limit);

            spans.push(start..end);
            start = end - self.chunk_overlap;
        }

        spans
    }

    /// Latest character position in `[min_end, limit]` that sits right after
    /// a separator, trying separators in preference order.
    fn find_break(
        &self,
        text: &str,
        bounds: &[usize],
        start: usize,
        min_end: usize,
        limit: usize,
    ) -> Option<usize> {
        let window = &text[bounds[start]..bounds[limit]];

        SEPARATORS.iter().find_map(|sep| {
            let byte_end = bounds[start] + window.rfind(sep)? + sep.len();
            // Separators are ASCII, so byte_end is always a char boundary
            let end = bounds.binary_search(&byte_end).ok()?;
            (end >= min_end).then_some(end)
        })
    }
}

/// Byte offset of every char boundary, including the end of the string.
fn char_bounds(text: &str) -> Vec<usize> {
    text.char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect()
}
