//! Core data models.
//!
//! These types flow through the build path (loader → chunker → store) and
//! the query path (retriever → prompt assembly).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A loaded source file. Discarded once it has been chunked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Identifier of the source, normally the file path as loaded.
    pub source_id: String,
    pub raw_text: String,
}

impl Document {
    pub fn new(source_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            raw_text: raw_text.into(),
        }
    }
}

/// A bounded window of a document's text; the unit that is embedded,
/// stored and retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_id: String,
    /// Position of the chunk within its document, starting at 0.
    pub index: usize,
    /// Character offset of the chunk's first character in the document.
    pub offset: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A stored chunk matched by a query. Lower distance means closer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub chunk: Chunk,
    pub distance: f64,
}

/// Deterministic digest over the ordered content of the eligible documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusFingerprint {
    pub digest: String,
    /// Number of files whose bytes went into the digest.
    pub files_hashed: usize,
    /// Files that were eligible but could not be read.
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl CorpusFingerprint {
    /// True when every eligible file contributed to the digest.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Persisted record of the corpus digest that produced a collection.
///
/// Written only after the collection write has succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexState {
    pub digest: String,
    pub collection: String,
    #[serde(default)]
    pub document_count: usize,
    #[serde(default)]
    pub chunk_count: usize,
    #[serde(default)]
    pub built_at: Option<DateTime<Utc>>,
}

impl IndexState {
    /// True when this state vouches for `collection` built from `digest`.
    pub fn matches(&self, digest: &str, collection: &str) -> bool {
        self.digest == digest && self.collection == collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_state_matches_requires_digest_and_collection() {
        let state = IndexState {
            digest: "abc".to_string(),
            collection: "docs".to_string(),
            document_count: 1,
            chunk_count: 3,
            built_at: None,
        };
        assert!(state.matches("abc", "docs"));
        assert!(!state.matches("abd", "docs"));
        assert!(!state.matches("abc", "other"));
    }

    #[test]
    fn test_fingerprint_completeness() {
        let mut fp = CorpusFingerprint {
            digest: "d".to_string(),
            files_hashed: 2,
            skipped: Vec::new(),
        };
        assert!(fp.is_complete());
        fp.skipped.push("broken.md".to_string());
        assert!(!fp.is_complete());
    }
}
