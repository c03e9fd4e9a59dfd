//! Fixed-window text chunker.
//!
//! Walks a document in windows of `chunk_size` characters, advancing by
//! `chunk_size - chunk_overlap` each step. Consecutive chunks share exactly
//! `chunk_overlap` characters; the final window may be shorter. A document
//! no longer than `chunk_size` yields a single chunk equal to its full text.
//!
//! Offsets and lengths are counted in `char`s so multi-byte text never splits
//! inside a code point. Chunking is a pure function of the input text and the
//! window configuration.
//!
//! # Example
//!
//! ```rust
//! use rag_index::chunk::Chunker;
//!
//! let chunker = Chunker::new(4, 1).unwrap();
//! let windows: Vec<_> = chunker.windows("abcdefghij").collect();
//! assert_eq!(windows, vec![(0, "abcd"), (3, "defg"), (6, "ghij")]);
//! ```

use crate::config::ChunkingConfig;
use crate::error::{IndexError, Result};
use crate::hasher::digest_text;
use crate::models::{Chunk, RawDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Fails unless `0 <= overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IndexError::Config("chunk_size must be > 0".into()));
        }
        if overlap >= chunk_size {
            return Err(IndexError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// `(start_char, text)` for every window of `text`, in order.
    pub fn windows<'a>(&self, text: &'a str) -> impl Iterator<Item = (usize, &'a str)> + 'a {
        // Byte offset of every char boundary, including the end of the text.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n_chars = bounds.len() - 1;
        let size = self.chunk_size;
        let step = self.chunk_size - self.overlap;

        let mut start = 0usize;
        let mut done = false;
        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let end = (start + size).min(n_chars);
            let window = (start, &text[bounds[start]..bounds[end]]);
            if end == n_chars {
                done = true;
            } else {
                start += step;
            }
            Some(window)
        })
    }

    /// Split one document into ordered chunks with contiguous `seq` numbers.
    pub fn split(&self, doc: &RawDocument) -> Vec<Chunk> {
        self.windows(&doc.text)
            .enumerate()
            .map(|(seq, (start_char, text))| Chunk {
                source: doc.source.clone(),
                page: doc.metadata.page,
                seq,
                start_char,
                char_len: text.chars().count(),
                text: text.to_string(),
                hash: digest_text(text),
            })
            .collect()
    }
}
