//! # rag-index
//!
//! Incremental document indexing and similarity retrieval for a
//! retrieval-augmented chat backend.
//!
//! A folder of documents is scanned, digested and compared against a
//! persisted ledger. Changed files are chunked and embedded; the resulting
//! vector index is saved next to the ledger and swapped in atomically.
//! Retrieval embeds a query and returns the top-k most similar chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │   Loader   │──▶│ Chunker  │──▶│ Embedding │──▶│ VectorIndex  │
//! │walk+extract│   │ windows  │   │ batches   │   │ cosine, kNN  │
//! └─────┬──────┘   └──────────┘   └───────────┘   └──────┬───────┘
//!       │ digests                                        │ save
//!       ▼                                                ▼
//! ┌────────────┐          commit after save        ┌──────────────┐
//! │ HashLedger │◀──────────────────────────────────│ index.sqlite │
//! └────────────┘                                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragx refresh --dir ./documents       # scan, embed changes, persist
//! ragx search "deployment checklist"   # top-k chunks
//! ragx stats                           # what is indexed
//! ragx reset                           # forget everything
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`error`] | Error taxonomy |
//! | [`logging`] | tracing subscriber setup |
//! | [`models`] | Core data types |
//! | [`hasher`] | Content digests |
//! | [`ledger`] | Persisted path → digest ledger |
//! | [`extract`] | Extension → extractor table |
//! | [`loader`] | Directory scanning |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction and batching |
//! | [`vector_index`] | Nearest-neighbor index, save and load |
//! | [`db`] | Artifact database connection |
//! | [`migrate`] | Artifact schema |
//! | [`indexer`] | Refresh orchestration and search |
//! | [`progress`] | Refresh progress reporting |
//! | [`stats`] | Store statistics |

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod hasher;
pub mod indexer;
pub mod ledger;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod stats;
pub mod vector_index;

pub use error::{IndexError, Result};
pub use indexer::{Indexer, RefreshReport};
