//! Core data types that flow through scanning, chunking and retrieval.

use serde::Serialize;
use std::path::PathBuf;

/// Format-derived metadata attached to a [`RawDocument`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// Extractor name, e.g. `"pdf"` or `"markdown"`.
    pub format: &'static str,
    /// 1-based page number for paginated formats.
    pub page: Option<u32>,
}

/// Text extracted from one source file (or one page of it).
///
/// Immutable once produced by the loader.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Ledger key: path relative to the scanned directory, `/`-separated.
    pub source: String,
    /// Absolute path on disk, used for hashing.
    pub path: PathBuf,
    pub text: String,
    pub metadata: DocumentMetadata,
}

/// A bounded, overlapping window of a document's text.
///
/// Chunks are the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source: String,
    pub page: Option<u32>,
    /// Position of this chunk within its document, starting at 0.
    pub seq: usize,
    /// Offset of the first character, counted in chars, not bytes.
    pub start_char: usize,
    pub char_len: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A retrieval result handed to the chat layer.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub seq: usize,
    pub score: f32,
}
