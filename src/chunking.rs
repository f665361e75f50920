//! Line-bounded chunking with overlap.
//!
//! Transcripts are split on line boundaries, never inside a line. Chunks are packed greedily up
//! to a character budget, and a fraction of each chunk's trailing lines is repeated at the head
//! of the next chunk so that statements spanning a boundary stay visible to both partial
//! summaries.
//!
//! - Budget: the rendered chunk (lines joined with `\n`) never exceeds `limit` characters unless a
//!   single line is longer than the budget on its own; such a line becomes its own chunk.
//! - Overlap: `max(1, floor(lines * overlap_ratio))` lines carry over, and every chunk starts at
//!   least one line after the previous one, which guarantees termination.
//! - Empty input yields a single chunk holding the input verbatim, so downstream callers always
//!   have something to summarize.
//! - Line endings: `\r\n` is accepted as a line break and chunk text is always rejoined with
//!   `\n`, so CRLF transcripts come out with LF endings.

use thiserror::Error;

use crate::config::{DEFAULT_CHUNK_CHAR_LIMIT, DEFAULT_OVERLAP_RATIO};

/// Errors produced while validating chunking parameters.
#[derive(Debug, Error, PartialEq)]
pub enum ChunkingError {
    /// Chunk limit or overlap ratio is outside its accepted range.
    #[error("invalid chunking configuration: {0}")]
    InvalidConfiguration(String),
}

/// Validated chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkingOptions {
    limit: usize,
    overlap_ratio: f64,
}

impl ChunkingOptions {
    /// Validate a character limit (`> 0`) and overlap ratio (`0.0 <= ratio < 1.0`).
    pub fn new(limit: usize, overlap_ratio: f64) -> Result<Self, ChunkingError> {
        if limit == 0 {
            return Err(ChunkingError::InvalidConfiguration(
                "chunk character limit must be greater than zero".into(),
            ));
        }
        if !overlap_ratio.is_finite() || !(0.0..1.0).contains(&overlap_ratio) {
            return Err(ChunkingError::InvalidConfiguration(format!(
                "overlap ratio must be in [0, 1), got {overlap_ratio}"
            )));
        }
        Ok(Self {
            limit,
            overlap_ratio,
        })
    }

    /// Maximum rendered characters per chunk.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Fraction of a chunk's lines repeated in the next chunk.
    pub fn overlap_ratio(&self) -> f64 {
        self.overlap_ratio
    }
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_CHUNK_CHAR_LIMIT,
            overlap_ratio: DEFAULT_OVERLAP_RATIO,
        }
    }
}

/// A contiguous run of document lines rendered back to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Index of the first line covered by the chunk.
    pub start_line: usize,
    /// Index one past the last line covered by the chunk.
    pub end_line: usize,
    /// Trimmed text of the covered lines joined with `\n`.
    pub text: String,
}

/// Raw input text viewed as an ordered sequence of lines.
#[derive(Debug, Clone, Copy)]
pub struct Document<'a> {
    raw: &'a str,
}

impl<'a> Document<'a> {
    /// Wrap raw text without copying it.
    pub fn new(raw: &'a str) -> Self {
        Self { raw }
    }

    /// The original, unmodified text.
    pub fn raw(&self) -> &'a str {
        self.raw
    }

    /// Split into lines on `\n` / `\r\n` boundaries.
    pub fn lines(&self) -> Vec<&'a str> {
        self.raw.lines().collect()
    }

    /// Split the document into overlapping chunks. See [`chunk_document`].
    pub fn chunk(&self, options: &ChunkingOptions) -> Vec<Chunk> {
        chunk_document(self, options)
    }
}

/// Chunk raw text, validating `limit` and `overlap_ratio` first.
///
/// Returns only the rendered chunk strings; use [`Document::chunk`] for line ranges.
pub fn chunk_text(
    text: &str,
    limit: usize,
    overlap_ratio: f64,
) -> Result<Vec<String>, ChunkingError> {
    let options = ChunkingOptions::new(limit, overlap_ratio)?;
    Ok(chunk_document(&Document::new(text), &options)
        .into_iter()
        .map(|chunk| chunk.text)
        .collect())
}

/// Greedily pack lines into chunks, carrying trailing lines forward as overlap.
///
/// Always returns at least one chunk.
pub fn chunk_document(document: &Document<'_>, options: &ChunkingOptions) -> Vec<Chunk> {
    let lines = document.lines();
    let total = lines.len();
    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < total {
        let mut end = start;
        let mut size = 0usize;
        while end < total {
            let separator = usize::from(end > start);
            let line_len = lines[end].chars().count();
            if end > start && size + separator + line_len > options.limit {
                break;
            }
            size += separator + line_len;
            end += 1;
        }

        let text = lines[start..end].join("\n");
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            chunks.push(Chunk {
                start_line: start,
                end_line: end,
                text: trimmed.to_string(),
            });
        }

        if end >= total {
            break;
        }

        let taken = end - start;
        let overlap = overlap_lines(taken, options.overlap_ratio);
        start = (start + taken - overlap).max(start + 1);
    }

    if chunks.is_empty() {
        chunks.push(Chunk {
            start_line: 0,
            end_line: total,
            text: document.raw().to_string(),
        });
    }

    tracing::trace!(
        lines = total,
        chunks = chunks.len(),
        limit = options.limit,
        overlap_ratio = options.overlap_ratio,
        "Chunked document"
    );
    chunks
}

fn overlap_lines(taken: usize, overlap_ratio: f64) -> usize {
    ((taken as f64 * overlap_ratio).floor() as usize).max(1)
}
