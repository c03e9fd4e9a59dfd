//! Refresh orchestration and the live index handle.
//!
//! The [`Indexer`] owns the current [`VectorIndex`] behind an
//! `RwLock<Option<Arc<_>>>`. Searches clone the `Arc` and release the lock
//! immediately; a rebuild assembles a complete new index off to the side,
//! saves it, commits the ledger and only then swaps the reference. Refreshes
//! and resets are serialized by a separate async mutex.
//!
//! # Refresh
//!
//! ```text
//! scan ─► digest ─► ledger diff ─┬─ clean ──► load artifact ─► swap      (false)
//!                                └─ changed ─► chunk + embed changed files
//!                                              reuse unchanged files' vectors
//!                                              build ─► save ─► commit ledger ─► swap (true)
//! ```
//!
//! A file is carried over from the previous index (in memory, or loaded from
//! disk) when that index was built with the same model and chunking and
//! records the file's current digest. The ledger alone never decides reuse.
//! Files that disappeared from the scan are dropped from both the index and
//! the ledger. Any failure before the ledger commit leaves the ledger and the
//! live index exactly as they were.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{embed_all, retry_budget, BatchOptions, EmbeddingProvider};
use crate::error::{IndexError, Result};
use crate::extract::ExtractorRegistry;
use crate::ledger::HashLedger;
use crate::loader::{DocumentLoader, ScannedFile};
use crate::models::{Chunk, SearchHit};
use crate::progress::{NoProgress, ProgressReporter, RefreshEvent};
use crate::vector_index::{self, IndexMeta, VectorIndex};

/// What a refresh did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// False when the persisted index was loaded as-is.
    pub rebuilt: bool,
    pub files: usize,
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
    pub unchanged: usize,
    /// Chunks in the resulting index.
    pub chunks: usize,
    /// Chunks sent to the embedding provider.
    pub embedded: usize,
    /// Chunks carried over from the previous index.
    pub reused: usize,
}

pub struct Indexer {
    config: Config,
    provider: Arc<dyn EmbeddingProvider>,
    loader: DocumentLoader,
    chunker: Chunker,
    batch: BatchOptions,
    progress: Arc<dyn ProgressReporter>,
    current: RwLock<Option<Arc<VectorIndex>>>,
    writer: Mutex<()>,
}

impl Indexer {
    /// Fails with [`IndexError::Config`] on an invalid chunking window or
    /// exclude glob.
    pub fn new(config: Config, provider: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let chunker = Chunker::from_config(&config.chunking)?;
        let loader = DocumentLoader::new(&config, ExtractorRegistry::default())?;
        let batch = BatchOptions::from_config(&config.embedding);
        Ok(Self {
            config,
            provider,
            loader,
            chunker,
            batch,
            progress: Arc::new(NoProgress),
            current: RwLock::new(None),
            writer: Mutex::new(()),
        })
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Replace the extractor table, e.g. to register another format.
    pub fn with_extractors(mut self, registry: ExtractorRegistry) -> Result<Self> {
        self.loader = DocumentLoader::new(&self.config, registry)?;
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// The index searches currently run against.
    pub fn snapshot(&self) -> Option<Arc<VectorIndex>> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn install(&self, index: Option<VectorIndex>) {
        let next = index.map(Arc::new);
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next;
    }

    /// Load the persisted index, if any, without scanning the corpus.
    ///
    /// Returns `false` when there is no usable artifact. Mismatch errors
    /// propagate.
    pub async fn warm_start(&self) -> Result<bool> {
        let _guard = self.writer.lock().await;
        match self.load_persisted().await {
            Ok(index) => {
                debug!(chunks = index.len(), "warm start from persisted index");
                self.install(Some(index));
                Ok(true)
            }
            Err(IndexError::IndexNotFound { reason, .. }) => {
                debug!(%reason, "no persisted index to warm start from");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn load_persisted(&self) -> Result<VectorIndex> {
        let index =
            VectorIndex::load(&self.config.store.index_path(), self.provider.dims()).await?;
        if index.meta().model != self.provider.model_name() {
            return Err(IndexError::ModelMismatch {
                indexed: index.meta().model.clone(),
                provider: self.provider.model_name().to_string(),
            });
        }
        Ok(index)
    }

    /// Bring the index up to date with `dir`. Returns whether it was rebuilt.
    pub async fn refresh(&self, dir: &Path) -> Result<bool> {
        self.refresh_report(dir).await.map(|report| report.rebuilt)
    }

    /// [`refresh`](Self::refresh) with a breakdown of what happened.
    pub async fn refresh_report(&self, dir: &Path) -> Result<RefreshReport> {
        let _guard = self.writer.lock().await;

        self.progress.report(RefreshEvent::Scanning {
            root: dir.display().to_string(),
        });
        let files = self.loader.scan_files(dir).await?;
        let digests: BTreeMap<String, String> = files
            .iter()
            .map(|f| (f.source.clone(), f.digest.clone()))
            .collect();

        let mut ledger = HashLedger::load(&self.config.store.ledger_path()).await?;
        let diff = ledger.diff(&digests);
        self.progress.report(RefreshEvent::Diffed {
            added: diff.added.len(),
            modified: diff.modified.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged.len(),
        });

        let mut report = RefreshReport {
            rebuilt: false,
            files: files.len(),
            added: diff.added.len(),
            modified: diff.modified.len(),
            removed: diff.removed.len(),
            unchanged: diff.unchanged.len(),
            ..RefreshReport::default()
        };

        let mut loaded = None;
        if diff.is_clean() && !ledger.is_empty() {
            match self.load_persisted().await {
                Ok(index) if index.source_digests() == &digests => {
                    report.chunks = index.len();
                    self.install(Some(index));
                    info!(files = report.files, "index up to date; loaded persisted artifact");
                    return Ok(report);
                }
                Ok(index) => {
                    warn!("index artifact does not match the ledger; rebuilding stale sources");
                    loaded = Some(Arc::new(index));
                }
                Err(IndexError::IndexNotFound { reason, .. }) => {
                    warn!(%reason, "ledger is current but the index artifact is unusable; rebuilding");
                }
                Err(e) => return Err(e),
            }
        }

        let previous = match loaded {
            Some(index) => Some(index),
            None => self.reusable_previous().await?,
        };
        let previous = previous.filter(|index| self.is_reusable(index));
        let rebuilt = self
            .rebuild(&files, previous.as_deref(), &mut report)
            .await?
            .with_source_digests(digests.clone());

        self.progress.report(RefreshEvent::Persisting {
            chunks: rebuilt.len(),
        });
        rebuilt.save(&self.config.store.index_path()).await?;
        ledger.commit(digests).await?;
        self.install(Some(rebuilt));

        report.rebuilt = true;
        info!(
            files = report.files,
            chunks = report.chunks,
            embedded = report.embedded,
            reused = report.reused,
            removed = report.removed,
            "index rebuilt"
        );
        Ok(report)
    }

    /// The live index, or the persisted one when nothing is loaded.
    async fn reusable_previous(&self) -> Result<Option<Arc<VectorIndex>>> {
        if let Some(index) = self.snapshot() {
            return Ok(Some(index));
        }
        match self.load_persisted().await {
            Ok(index) => Ok(Some(Arc::new(index))),
            Err(IndexError::IndexNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether chunks and vectors of `index` can be carried over.
    fn is_reusable(&self, index: &VectorIndex) -> bool {
        let compatible = index.is_compatible(
            self.provider.model_name(),
            self.provider.dims(),
            self.config.chunking,
        );
        if !compatible {
            debug!("previous index built with other settings; re-embedding everything");
        }
        compatible
    }

    /// Assemble a complete index for `files`, embedding only what cannot be
    /// reused from `previous`. A file is reused only if `previous` holds
    /// chunks extracted from exactly the scanned content.
    async fn rebuild(
        &self,
        files: &[ScannedFile],
        previous: Option<&VectorIndex>,
        report: &mut RefreshReport,
    ) -> Result<VectorIndex> {
        let reusable = previous.map(VectorIndex::entries_by_source).unwrap_or_default();
        let indexed_digest =
            |source: &str| previous.and_then(|index| index.source_digest(source));

        // Per file, either carried-over (chunk, vector) pairs or fresh chunks.
        enum Slot {
            Reused(Vec<(Chunk, Vec<f32>)>),
            Fresh(Vec<Chunk>),
        }

        let mut slots = Vec::with_capacity(files.len());
        let mut texts = Vec::new();
        for file in files {
            let unchanged = indexed_digest(&file.source) == Some(file.digest.as_str());
            match reusable.get(file.source.as_str()) {
                Some(entries) if unchanged => {
                    let pairs = entries
                        .iter()
                        .map(|(chunk, vector)| ((*chunk).clone(), vector.to_vec()))
                        .collect();
                    slots.push(Slot::Reused(pairs));
                }
                _ => {
                    let chunks: Vec<Chunk> = file
                        .documents
                        .iter()
                        .flat_map(|doc| self.chunker.split(doc))
                        .collect();
                    texts.extend(chunks.iter().map(|c| c.text.clone()));
                    slots.push(Slot::Fresh(chunks));
                }
            }
        }

        let total = texts.len();
        debug!(chunks = total, "embedding changed files");
        let progress = &self.progress;
        let mut fresh_vectors = embed_all(&self.provider, &texts, &self.batch, |done, total| {
            progress.report(RefreshEvent::Embedding { done, total })
        })
        .await?
        .into_iter();

        let mut chunks = Vec::new();
        let mut vectors = Vec::new();
        for slot in slots {
            match slot {
                Slot::Reused(pairs) => {
                    report.reused += pairs.len();
                    for (chunk, vector) in pairs {
                        chunks.push(chunk);
                        vectors.push(vector);
                    }
                }
                Slot::Fresh(fresh) => {
                    report.embedded += fresh.len();
                    for chunk in fresh {
                        let vector = fresh_vectors.next().ok_or_else(|| {
                            IndexError::EmbeddingProvider("fewer vectors than chunks".into())
                        })?;
                        chunks.push(chunk);
                        vectors.push(vector);
                    }
                }
            }
        }
        report.chunks = chunks.len();

        let meta = IndexMeta::new(
            self.provider.model_name(),
            self.provider.dims(),
            self.config.chunking,
        );
        VectorIndex::build(meta, chunks, vectors)
    }

    /// Top `k` chunks for `query`, best first.
    ///
    /// Empty when no index is loaded, the index has no chunks, or the query
    /// is blank. None of those call the embedding provider.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let Some(index) = self.snapshot() else {
            return Ok(Vec::new());
        };
        if index.is_empty() || k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        if index.meta().model != self.provider.model_name() {
            return Err(IndexError::ModelMismatch {
                indexed: index.meta().model.clone(),
                provider: self.provider.model_name().to_string(),
            });
        }

        let timeout = retry_budget(&self.config.embedding);
        let query_vector = tokio::time::timeout(timeout, self.provider.embed_one(query))
            .await
            .map_err(|_| IndexError::Timeout {
                operation: "query embedding",
                after: timeout,
            })?
            .map_err(|e| IndexError::EmbeddingProvider(format!("{:#}", e)))?;

        let hits = index.search(&query_vector, k)?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                text: hit.chunk.text,
                source: hit.chunk.source,
                page: hit.chunk.page,
                seq: hit.chunk.seq,
                score: hit.score,
            })
            .collect())
    }

    /// [`search`](Self::search) with the configured `top_k`.
    pub async fn search_default(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.search(query, self.config.retrieval.top_k).await
    }

    /// Drop the in-memory index, empty the ledger and delete the artifact.
    /// Idempotent.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.install(None);
        HashLedger::empty(self.config.store.ledger_path())
            .clear()
            .await?;
        vector_index::delete_artifact(&self.config.store.index_path()).await?;
        info!(store = %self.config.store.dir.display(), "index reset");
        Ok(())
    }
}
