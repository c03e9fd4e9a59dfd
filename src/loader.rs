//! Directory scanning and per-file extraction.
//!
//! The loader walks a directory, skips excluded paths and unsupported
//! extensions, then reads, digests and extracts every remaining file in
//! parallel on the blocking pool. A file that cannot be read or extracted is
//! logged and skipped; it never aborts the scan. A read that exceeds the I/O
//! timeout does abort it, since the scan result would otherwise be partial.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::extract::ExtractorRegistry;
use crate::hasher::digest_file;
use crate::models::{DocumentMetadata, RawDocument};

/// Always excluded, in addition to configured globs.
pub const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// One source file that produced at least one document.
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub source: String,
    pub digest: String,
    /// In page order.
    pub documents: Vec<RawDocument>,
}

pub struct DocumentLoader {
    registry: Arc<ExtractorRegistry>,
    excludes: GlobSet,
    follow_symlinks: bool,
    read_concurrency: usize,
    io_timeout: Duration,
}

impl DocumentLoader {
    pub fn new(config: &Config, registry: ExtractorRegistry) -> Result<Self> {
        let mut patterns: Vec<String> = DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(config.corpus.exclude_globs.iter().cloned());

        Ok(Self {
            registry: Arc::new(registry),
            excludes: build_globset(&patterns)?,
            follow_symlinks: config.corpus.follow_symlinks,
            read_concurrency: config.indexing.read_concurrency.max(1),
            io_timeout: config.indexing.io_timeout(),
        })
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }

    /// Every document under `dir`, sorted by (source, page).
    ///
    /// Fails with [`IndexError::EmptyCorpus`] when nothing was extracted.
    pub async fn scan(&self, dir: &Path) -> Result<Vec<RawDocument>> {
        let files = self.scan_files(dir).await?;
        Ok(files.into_iter().flat_map(|f| f.documents).collect())
    }

    /// Like [`scan`](Self::scan), grouped per source file with its digest.
    pub async fn scan_files(&self, dir: &Path) -> Result<Vec<ScannedFile>> {
        let candidates = self.walk(dir).await?;
        debug!(root = %dir.display(), candidates = candidates.len(), "walked corpus");

        let semaphore = Arc::new(Semaphore::new(self.read_concurrency));
        let mut tasks = JoinSet::new();
        for (source, path) in candidates {
            let registry = self.registry.clone();
            let semaphore = semaphore.clone();
            let io_timeout = self.io_timeout;
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let work = tokio::task::spawn_blocking(move || load_file(&registry, source, path));
                tokio::time::timeout(io_timeout, work).await
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| IndexError::io(dir, std::io::Error::other(e)))?;
            match outcome {
                Err(_) => {
                    tasks.abort_all();
                    return Err(IndexError::Timeout {
                        operation: "file read",
                        after: self.io_timeout,
                    });
                }
                Ok(Err(e)) => {
                    return Err(IndexError::io(dir, std::io::Error::other(e)));
                }
                Ok(Ok(Some(file))) => files.push(file),
                Ok(Ok(None)) => {}
            }
        }

        if files.is_empty() {
            return Err(IndexError::EmptyCorpus {
                root: dir.to_path_buf(),
            });
        }

        files.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(files)
    }

    /// (source key, absolute path) for every supported, non-excluded file.
    async fn walk(&self, dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let root = dir.to_path_buf();
        let meta = tokio::fs::metadata(&root)
            .await
            .map_err(|e| IndexError::io(&root, e))?;
        if !meta.is_dir() {
            return Err(IndexError::io(&root, std::io::Error::other("not a directory")));
        }

        let registry = self.registry.clone();
        let excludes = self.excludes.clone();
        let follow = self.follow_symlinks;
        let walk_root = root.clone();
        let walked = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for entry in WalkDir::new(&walk_root).follow_links(follow) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(error = %e, "skipping unreadable directory entry");
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let relative = path.strip_prefix(&walk_root).unwrap_or(path);
                let source = source_key(relative);
                if excludes.is_match(&source) {
                    continue;
                }

                let supported = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| registry.supports(ext));
                if !supported {
                    debug!(source = %source, "unsupported extension, skipping");
                    continue;
                }
                out.push((source, path.to_path_buf()));
            }
            out
        })
        .await
        .map_err(|e| IndexError::io(&root, std::io::Error::other(e)))?;

        Ok(walked)
    }
}

/// Read, digest and extract one file. `None` means skipped.
fn load_file(registry: &ExtractorRegistry, source: String, path: PathBuf) -> Option<ScannedFile> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    let extractor = registry.lookup(ext)?;

    let digest = match digest_file(&path) {
        Ok(digest) => digest,
        Err(e) => {
            warn!(source = %source, error = %e, "cannot hash file, skipping");
            return None;
        }
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(source = %source, error = %e, "cannot read file, skipping");
            return None;
        }
    };

    let extracted = match extractor.extract(&bytes) {
        Ok(extracted) => extracted,
        Err(e) => {
            warn!(source = %source, error = %e, "extraction failed, skipping");
            return None;
        }
    };

    let mut documents: Vec<RawDocument> = extracted
        .into_iter()
        .filter(|unit| !unit.text.trim().is_empty())
        .map(|unit| RawDocument {
            source: source.clone(),
            path: path.clone(),
            text: unit.text,
            metadata: DocumentMetadata {
                format: extractor.format(),
                page: unit.page,
            },
        })
        .collect();

    if documents.is_empty() {
        debug!(source = %source, "no text extracted, skipping");
        return None;
    }
    documents.sort_by_key(|d| d.metadata.page);

    Some(ScannedFile {
        source,
        digest,
        documents,
    })
}

/// `/`-separated relative path, stable across platforms.
fn source_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexError::Config(format!("invalid exclude glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| IndexError::Config(format!("invalid exclude globs: {}", e)))
}
