//! Recursive character text splitter.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters,
//! with consecutive chunks of the same document sharing up to
//! `chunk_overlap` characters.
//!
//! # Algorithm
//!
//! 1. Pick the coarsest separator present in the text, from
//!    `"\n\n"` (paragraph) → `"\n"` (line) → `". "` (sentence) → `" "`
//!    (word) → `""` (character).
//! 2. Split on it, keeping each separator attached to the start of the
//!    piece that follows it, so pieces stay contiguous substrings.
//! 3. Pieces shorter than `chunk_size` are merged greedily into windows;
//!    when a window is full it is emitted and pieces are dropped from its
//!    front until at most `chunk_overlap` characters remain.
//! 4. Pieces that are too long on their own are split again with the
//!    remaining, finer separators.
//! 5. Windows are trimmed; whitespace-only windows are dropped.
//!
//! Lengths are measured in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::RecursiveSplitter;
//! use docqa_core::models::Document;
//!
//! let splitter = RecursiveSplitter::new(100, 20).unwrap();
//! let docs = vec![Document::new("notes.md", "A short note.")];
//! let chunks = splitter.split_documents(&docs).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].offset, 0);
//! ```

use std::collections::VecDeque;

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::{Chunk, Document};

pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_CHUNK_OVERLAP: usize = 20;

/// Separators tried in order, coarsest first. The empty separator splits
/// into single characters and always succeeds.
const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Chunking produced nothing the index could use.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    #[error("no documents to chunk")]
    NoDocuments,
    #[error("documents produced no chunks")]
    NoChunks,
}

#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveSplitter {
    /// Create a splitter. Fails unless `0 < chunk_overlap + 1 <= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Chunk every document, in order, preserving source attribution.
    pub fn split_documents(&self, docs: &[Document]) -> Result<Vec<Chunk>, ChunkingError> {
        if docs.is_empty() {
            return Err(ChunkingError::NoDocuments);
        }

        let chunks: Vec<Chunk> = docs
            .iter()
            .flat_map(|doc| self.split_document(doc))
            .collect();

        if chunks.is_empty() {
            return Err(ChunkingError::NoChunks);
        }
        Ok(chunks)
    }

    /// Chunk a single document. Whitespace-only documents yield nothing.
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        let text = doc.raw_text.as_str();
        let mut cursor = CharCursor::default();

        self.split_windows(text)
            .into_iter()
            .enumerate()
            .map(|(index, window)| {
                let offset = cursor.advance_to(text, window.start);
                make_chunk(&doc.source_id, index, offset, window.text.to_string())
            })
            .collect()
    }

    /// Split raw text into trimmed, non-empty windows.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_windows(text)
            .into_iter()
            .map(|w| w.text.to_string())
            .collect()
    }

    fn split_windows<'a>(&self, text: &'a str) -> Vec<Window<'a>> {
        self.split_recursive(text, 0, &self.separators)
            .into_iter()
            .filter_map(|(start, end)| {
                let raw = &text[start..end];
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return None;
                }
                let lead = raw.len() - raw.trim_start().len();
                Some(Window {
                    start: start + lead,
                    text: trimmed,
                })
            })
            .collect()
    }

    /// Byte ranges of untrimmed windows over `text`, which starts at byte
    /// `base` of the document. Ranges come out in ascending start order.
    fn split_recursive(
        &self,
        text: &str,
        base: usize,
        separators: &[String],
    ) -> Vec<(usize, usize)> {
        let mut separator = "";
        let mut finer: &[String] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut small: Vec<Piece> = Vec::new();

        for (start, piece) in split_keep_separator(text, separator) {
            let len = char_len(piece);
            if len < self.chunk_size {
                small.push(Piece {
                    start: base + start,
                    end: base + start + piece.len(),
                    chars: len,
                });
                continue;
            }
            if !small.is_empty() {
                out.extend(self.merge_pieces(&small));
                small.clear();
            }
            if finer.is_empty() {
                out.push((base + start, base + start + piece.len()));
            } else {
                out.extend(self.split_recursive(piece, base + start, finer));
            }
        }

        if !small.is_empty() {
            out.extend(self.merge_pieces(&small));
        }
        out
    }

    /// Greedily pack contiguous pieces into windows of at most `chunk_size`
    /// characters, carrying up to `chunk_overlap` trailing characters into
    /// the next one.
    fn merge_pieces(&self, pieces: &[Piece]) -> Vec<(usize, usize)> {
        let mut windows = Vec::new();
        let mut current: VecDeque<&Piece> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            if total + piece.chars > self.chunk_size && !current.is_empty() {
                windows.push(span(&current));
                while total > self.chunk_overlap
                    || (total + piece.chars > self.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= front.chars,
                        None => break,
                    }
                }
            }
            current.push_back(piece);
            total += piece.chars;
        }

        if !current.is_empty() {
            windows.push(span(&current));
        }
        windows
    }
}

/// A trimmed window and the byte position where it starts in the document.
struct Window<'a> {
    start: usize,
    text: &'a str,
}

/// A contiguous byte range of the document with its length in characters.
struct Piece {
    start: usize,
    end: usize,
    chars: usize,
}

fn span(pieces: &VecDeque<&Piece>) -> (usize, usize) {
    let start = pieces.front().map_or(0, |p| p.start);
    let end = pieces.back().map_or(start, |p| p.end);
    (start, end)
}

/// Converts ascending byte positions to character positions without
/// rescanning the text from its start.
#[derive(Default)]
struct CharCursor {
    byte: usize,
    chars: usize,
}

impl CharCursor {
    fn advance_to(&mut self, text: &str, byte: usize) -> usize {
        if byte < self.byte {
            *self = Self::default();
        }
        self.chars += char_len(&text[self.byte..byte]);
        self.byte = byte;
        self.chars
    }
}

impl Default for RecursiveSplitter {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Split `text` on `separator`, attaching each separator to the start of
/// the following piece. Pieces carry their byte offset within `text`. An
/// empty separator splits into characters.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<(usize, &'a str)> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| (i, &text[i..i + c.len_utf8()]))
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push((start, &text[start..idx]));
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push((start, &text[start..]));
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(source_id: &str, index: usize, offset: usize, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        source_id: source_id.to_string(),
        index,
        offset,
        text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("doc.md", text)
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("word{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_short_document_single_chunk() {
        let text = "x".repeat(50);
        let splitter = RecursiveSplitter::new(100, 20).unwrap();
        let chunks = splitter.split_document(&doc(&text));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn test_empty_inputs_are_errors() {
        let splitter = RecursiveSplitter::default();
        assert_eq!(
            splitter.split_documents(&[]).unwrap_err(),
            ChunkingError::NoDocuments
        );
        assert_eq!(
            splitter.split_documents(&[doc("   \n\n  ")]).unwrap_err(),
            ChunkingError::NoChunks
        );
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(RecursiveSplitter::new(10, 10).is_err());
        assert!(RecursiveSplitter::new(0, 0).is_err());
        assert!(RecursiveSplitter::new(10, 9).is_ok());
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        let text = words(200);
        for (size, overlap) in [(100, 20), (50, 10), (30, 0), (64, 32)] {
            let splitter = RecursiveSplitter::new(size, overlap).unwrap();
            let chunks = splitter.split_document(&doc(&text));
            assert!(chunks.len() > 1);
            for c in &chunks {
                assert!(c.text.chars().count() <= size, "chunk too long: {:?}", c.text);
            }
            for pair in chunks.windows(2) {
                let prev_end = pair[0].offset + pair[0].text.chars().count();
                assert!(pair[1].offset > pair[0].offset);
                assert!(prev_end.saturating_sub(pair[1].offset) <= overlap);
            }
        }
    }

    #[test]
    fn test_overlap_is_carried_between_word_windows() {
        let splitter = RecursiveSplitter::new(100, 20).unwrap();
        let chunks = splitter.split_document(&doc(&words(100)));
        let prev_end = chunks[0].offset + chunks[0].text.chars().count();
        assert!(chunks[1].offset < prev_end, "expected consecutive chunks to overlap");
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para_a = "Alpha paragraph talks about shipping.";
        let para_b = "Beta paragraph talks about invoices.";
        let para_c = "Gamma paragraph talks about payments.";
        let text = format!("{}\n\n{}\n\n{}", para_a, para_b, para_c);
        let splitter = RecursiveSplitter::new(60, 0).unwrap();
        let chunks = splitter.split_document(&doc(&text));
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec![para_a, para_b, para_c]);
    }

    #[test]
    fn test_offsets_point_at_chunk_text() {
        let text = format!("Intro line.\n\n{}\n\nOutro.", words(60));
        let splitter = RecursiveSplitter::new(80, 15).unwrap();
        let chunks = splitter.split_document(&doc(&text));
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks {
            let n = c.text.chars().count();
            let slice: String = chars[c.offset..c.offset + n].iter().collect();
            assert_eq!(slice, c.text);
        }
    }

    #[test]
    fn test_large_multibyte_document_offsets() {
        let para = "Ünïcödé paragraph with some words in it. Another sentence here.\n";
        let text = format!("{}\n\n", para.repeat(4)).repeat(1500);
        let splitter = RecursiveSplitter::new(100, 20).unwrap();

        let started = std::time::Instant::now();
        let chunks = splitter.split_document(&doc(&text));
        assert!(started.elapsed() < std::time::Duration::from_secs(10));

        assert!(chunks.len() > 1000);
        let chars: Vec<char> = text.chars().collect();
        for c in &chunks {
            let n = c.text.chars().count();
            let slice: String = chars[c.offset..c.offset + n].iter().collect();
            assert_eq!(slice, c.text);
        }
        assert!(chunks.windows(2).all(|w| w[0].offset <= w[1].offset));
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let text = "a".repeat(250);
        let splitter = RecursiveSplitter::new(100, 20).unwrap();
        let chunks = splitter.split_document(&doc(&text));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].offset, 80);
        assert!(chunks.iter().all(|c| c.text.len() <= 100));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘".repeat(5);
        let splitter = RecursiveSplitter::new(30, 5).unwrap();
        let chunks = splitter.split_document(&doc(&text));
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().count() <= 30);
        }
    }

    #[test]
    fn test_source_attribution_and_indices() {
        let splitter = RecursiveSplitter::new(40, 5).unwrap();
        let docs = vec![
            Document::new("a.txt", words(30)),
            Document::new("b.md", "tiny"),
        ];
        let chunks = splitter.split_documents(&docs).unwrap();
        let a: Vec<&Chunk> = chunks.iter().filter(|c| c.source_id == "a.txt").collect();
        for (i, c) in a.iter().enumerate() {
            assert_eq!(c.index, i);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.source_id, "b.md");
        assert_eq!(last.index, 0);
        assert_eq!(last.text, "tiny");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta ".repeat(10);
        let splitter = RecursiveSplitter::new(25, 5).unwrap();
        let c1 = splitter.split_document(&doc(&text));
        let c2 = splitter.split_document(&doc(&text));
        assert_eq!(c1, c2);
    }
}
